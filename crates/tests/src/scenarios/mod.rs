mod live_playback;
mod submit_flow;

use ratatui::buffer::Buffer;

/// Rendered buffer as text, one line per row
pub(crate) fn screen(buffer: &Buffer) -> String {
    let width = buffer.area.width as usize;
    buffer
        .content
        .chunks(width)
        .map(|row| row.iter().map(|cell| cell.symbol()).collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}
