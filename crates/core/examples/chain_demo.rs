//! Example building an effect chain and the request the backend receives
//!
//! Run with: cargo run --package sigscope-core --example chain_demo

use sigscope_core::domain::config::SigscopeConfig;
use sigscope_core::domain::effects::{EffectChain, EffectType, FieldValue};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("sigscope_core=trace,info")
        .init();

    println!("=== Sigscope Effect Chain Demo ===\n");

    let mut chain = EffectChain::new();
    let bass = chain.add(EffectType::LowShelf);
    let reverb = chain.add(EffectType::Reverb);
    let chorus = chain.add(EffectType::Chorus);

    chain.update(bass, "gain", FieldValue::Number(6.0))?;
    chain.update(reverb, "start", FieldValue::Time(Some(5.0)))?;
    chain.update(reverb, "end", FieldValue::Time(Some(12.0)))?;
    chain.reorder(chorus, 0)?;

    for (position, effect) in chain.iter().enumerate() {
        println!(
            "{}. {} [{}] {:?}",
            position + 1,
            effect.effect_type.label(),
            effect.time_range_label(),
            effect.parameters
        );
    }

    if let Err(e) = chain.update(reverb, "end", FieldValue::Time(Some(1.0))) {
        println!("\nRejected edit: {}", e);
    }

    println!("\nWire format:");
    println!("{}", serde_json::to_string_pretty(&chain.to_wire_format())?);

    println!("\nDefault configuration:");
    print!("{}", SigscopeConfig::default().to_toml()?);

    Ok(())
}
