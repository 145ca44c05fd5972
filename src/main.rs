//! Resolve a JSON module set and print the wirings and diagnostics.
//!
//! ```text
//! modweave --modules set.json
//! modweave --modules set.json --trigger app --mandatory-triggers --json
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use modweave::args::Args;
use modweave::runner::{run_set, RunOptions, RunOutput};
use modweave_index::load_set;

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let json = std::fs::read_to_string(&args.modules)
        .with_context(|| format!("reading {}", args.modules.display()))?;
    let descriptors = load_set(&json)?;

    let options = RunOptions {
        batch_size: args.batch_size,
        triggers: args.trigger.clone(),
        mandatory_triggers: args.mandatory_triggers,
    };
    let output = run_set(descriptors, &options)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&render_json(&output))?);
    } else {
        print_text(&output);
    }

    if output.failure.is_some() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_text(output: &RunOutput) {
    let resolved = output
        .resources
        .iter()
        .filter(|r| output.wirings.contains_key(&r.key()))
        .count();
    println!(
        "resolved {resolved} of {} modules",
        output.resources.len()
    );
    for resource in &output.resources {
        match output.wirings.get(&resource.key()) {
            Some(wiring) => {
                println!("  [ok] {resource}");
                for wire in wiring.required_wires() {
                    println!("       requires {wire}");
                }
                for wire in wiring.provided_wires() {
                    println!("       provides {wire}");
                }
            }
            None => println!("  [--] {resource}"),
        }
    }
    if !output.report.is_empty() {
        println!("diagnostics:");
        for resource in output.report.resources() {
            if let Some(message) = output.report.message_for(resource.key()) {
                for line in message.lines() {
                    println!("  {line}");
                }
            }
        }
    }
    if let Some(failure) = &output.failure {
        println!("resolution failed: {failure}");
    }
}

fn render_json(output: &RunOutput) -> serde_json::Value {
    let modules: Vec<serde_json::Value> = output
        .resources
        .iter()
        .map(|resource| {
            let wiring = output.wirings.get(&resource.key());
            serde_json::json!({
                "name": resource.symbolic_name(),
                "version": resource.version().to_string(),
                "id": resource.key().to_string(),
                "resolved": wiring.is_some(),
                "required": wiring
                    .map(|w| w.required_wires().iter().map(|x| x.to_string()).collect::<Vec<_>>())
                    .unwrap_or_default(),
                "provided": wiring
                    .map(|w| w.provided_wires().iter().map(|x| x.to_string()).collect::<Vec<_>>())
                    .unwrap_or_default(),
            })
        })
        .collect();
    serde_json::json!({
        "modules": modules,
        "report": output.report.to_json(),
        "failure": output.failure,
    })
}
