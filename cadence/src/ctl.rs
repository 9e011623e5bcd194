//! cadencectl - Cadence control utility

use anyhow::Result;
use cadence::ipc::IpcClient;
use clap::{Parser, Subcommand, ValueEnum};

/// Cadence control utility
#[derive(Parser)]
#[command(name = "cadencectl", version, about = "Control the Cadence hotplug daemon")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Socket path
    #[arg(long, default_value = "/run/cadence/cadence.sock")]
    socket: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Show controller status
    Status,

    /// Read a tunable
    Get {
        /// Attribute name (see `list`)
        name: String,
    },

    /// Write a tunable
    Set {
        /// Attribute name
        name: String,

        /// New value, e.g. `1`, `400 100:200`, or `2 190 100` for load_levels
        #[arg(num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },

    /// List all tunables with their values
    List,

    /// Fire the external wake trigger
    Wake,

    /// Report a display power change
    Display {
        #[arg(value_enum)]
        state: DisplayState,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DisplayState {
    On,
    Off,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = IpcClient::new(&cli.socket);

    match cli.command {
        Commands::Status => {
            let status = client.get_status().await?;
            let c = &status.controller;

            println!("Cadence Status");
            println!("==============");
            println!("Version:       {}", status.version);
            println!("Enabled:       {}", if c.enabled { "yes" } else { "no" });
            println!("Power state:   {:?}", c.power);
            println!("Display:       {:?}", c.display);
            println!();
            println!("Load:          {} (max core {})", c.average_load, c.max_core_load);
            println!(
                "Little online: {}{}",
                c.online_little,
                c.little_target
                    .map(|t| format!(" (target {})", t))
                    .unwrap_or_default()
            );
            println!("Big online:    {} ({})", c.online_big, c.big_readiness);
            println!(
                "Cycle:         {}",
                if c.cycle_scheduled { "scheduled" } else { "idle" }
            );
        }

        Commands::Get { name } => {
            let attr = client.get_attribute(&name).await?;
            println!("{}", attr.value);
        }

        Commands::Set { name, value } => {
            let value = value.join(" ");
            client.set_attribute(&name, &value).await?;
            println!("{} set to: {}", name, value);
        }

        Commands::List => {
            let attrs = client.list_attributes().await?;
            println!("Tunables");
            println!("========");
            for attr in &attrs {
                let marker = if attr.writable { "" } else { " (read-only)" };
                if attr.value.contains('\n') {
                    println!("{}{}:", attr.name, marker);
                    for line in attr.value.lines() {
                        println!("    {}", line);
                    }
                } else {
                    println!("{:<22}{}{}", attr.name, attr.value, marker);
                }
            }
        }

        Commands::Wake => {
            client.wake().await?;
            println!("Wake trigger sent");
        }

        Commands::Display { state } => {
            let event = client.display(matches!(state, DisplayState::Off)).await?;
            println!("Display event: {:?}", event);
        }
    }

    Ok(())
}
