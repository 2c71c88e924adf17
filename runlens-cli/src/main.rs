// Copyright 2025 Runlens (https://github.com/runlens)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Command-line front end for run post-mortems over JSON telemetry
//! fixtures.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use runlens_analysis::{MemoryStore, Reconstructor};
use runlens_core::{ReconstructedRun, ReconstructionConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "runlens", version, about = "Post-mortem analysis of AI agent runs")]
struct Cli {
    /// Increase log verbosity.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconstruct a run and print its full post-mortem.
    Reconstruct {
        /// Telemetry fixture with `runs` and `steps` arrays.
        fixture: PathBuf,
        /// Run to reconstruct.
        #[arg(long)]
        run_id: String,
        /// Emit the reconstructed run as JSON instead of a report.
        #[arg(long)]
        json: bool,
    },
    /// Print only the failure signals derived for a run.
    Signals {
        fixture: PathBuf,
        #[arg(long)]
        run_id: String,
    },
    /// Print only the cost summary for a run.
    Cost {
        fixture: PathBuf,
        #[arg(long)]
        run_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ReconstructionConfig::from_env().context("invalid configuration")?;

    match cli.command {
        Commands::Reconstruct {
            fixture,
            run_id,
            json,
        } => {
            let run = reconstruct(&fixture, &run_id, config).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&run)?);
            } else {
                print_report(&run);
            }
        }
        Commands::Signals { fixture, run_id } => {
            let run = reconstruct(&fixture, &run_id, config).await?;
            println!("{}", serde_json::to_string_pretty(&run.signals)?);
        }
        Commands::Cost { fixture, run_id } => {
            let run = reconstruct(&fixture, &run_id, config).await?;
            println!("{}", serde_json::to_string_pretty(&run.cost)?);
        }
    }

    Ok(())
}

async fn reconstruct(
    fixture: &PathBuf,
    run_id: &str,
    config: ReconstructionConfig,
) -> Result<ReconstructedRun> {
    let store = MemoryStore::from_json_file(fixture)
        .with_context(|| format!("failed to load fixture {}", fixture.display()))?;
    let reconstructor = Reconstructor::new(store, config);

    match reconstructor.reconstruct(run_id).await? {
        Some(run) => Ok(run),
        None => bail!("run {run_id} not found in fixture"),
    }
}

fn print_report(run: &ReconstructedRun) {
    println!("Run:       {}", run.metadata.run_id);
    println!("Agent:     {} ({})", run.metadata.agent_name, run.metadata.framework);
    println!("Status:    {}", run.status);
    println!("Steps:     {}", run.timeline.step_count);
    if let Some(duration_ms) = run.timeline.duration_ms {
        println!("Duration:  {duration_ms}ms");
    }
    println!("Cost:      ${:.4}", run.cost.total_cost_usd);

    if let Some(post_mortem) = &run.post_mortem {
        println!();
        println!(
            "Failure:   {} (confidence {:.2})",
            post_mortem.classification.primary_type, post_mortem.classification.confidence
        );
        println!("Reason:    {}", post_mortem.classification.reason);
        if let Some(tags) = &post_mortem.classification.secondary_tags {
            println!("Tags:      {}", tags.join(", "));
        }
        println!();
        println!("{}", post_mortem.explanation);
    }
}
