//! kadnode - Inspect the routing table a node configuration produces

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kadnode_core::{generate_random_node_id, hex_to_id, id_to_hex, NetworkNode, Options, K};
use kadnode_dht::{xor_distance, InsertOutcome, RoutingTable};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "kadnode")]
#[command(about = "Kademlia routing table inspector", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "kadnode.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show our node and bucket occupancy after loading the bootstrap contacts
    Show,

    /// List the known contacts closest to a target ID
    Closest {
        /// Target ID (hex-encoded)
        #[arg(required = true)]
        target: String,

        /// Maximum number of contacts
        #[arg(short = 'n', long, default_value_t = K)]
        count: usize,

        /// IDs to leave out of the result (hex-encoded)
        #[arg(short, long)]
        ignore: Vec<String>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Generate a random node ID
    RandomId,
}

#[derive(Serialize)]
struct ClosestEntry {
    #[serde(flatten)]
    node: NetworkNode,
    distance: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Show => {
            let table = load_table(&cli.config)?;
            show_table(&table);
        }
        Commands::Closest {
            target,
            count,
            ignore,
            json,
        } => {
            let table = load_table(&cli.config)?;
            closest(&table, &target, count, &ignore, json)?;
        }
        Commands::RandomId => {
            println!("{}", id_to_hex(&generate_random_node_id()));
        }
    }

    Ok(())
}

/// Build the routing table from config and feed it the bootstrap contacts
fn load_table(path: &std::path::Path) -> Result<RoutingTable> {
    let options = Options::load(path)
        .with_context(|| format!("Failed to load config {}", path.display()))?;
    let table = RoutingTable::from_options(&options)?;

    let bootstrap = options.bootstrap_nodes()?;
    let mut dropped = 0;
    for node in bootstrap.iter().copied() {
        if table.add_node(node) == InsertOutcome::Full {
            dropped += 1;
        }
    }
    tracing::info!(
        "Loaded {} bootstrap contacts ({} dropped, bucket full)",
        bootstrap.len(),
        dropped
    );

    Ok(table)
}

fn show_table(table: &RoutingTable) {
    println!("Node: {}", table.self_node());
    println!("Contacts: {}", table.len());

    for index in (0..kadnode_core::ID_BITS).rev() {
        let Ok(contacts) = table.bucket_contacts(index) else {
            continue;
        };
        if contacts.is_empty() {
            continue;
        }
        println!("Bucket {:3}: {:2}/{}", index, contacts.len(), table.config().k);
        for contact in contacts {
            println!("    {}", contact.node);
        }
    }
}

fn closest(
    table: &RoutingTable,
    target: &str,
    count: usize,
    ignore: &[String],
    json: bool,
) -> Result<()> {
    let target = hex_to_id(target)?;
    let ignored = ignore
        .iter()
        .map(|s| hex_to_id(s))
        .collect::<kadnode_core::Result<Vec<_>>>()?;

    let entries: Vec<ClosestEntry> = table
        .closest_contacts(count, &target, &ignored)
        .into_iter()
        .map(|c| ClosestEntry {
            node: c.node,
            distance: id_to_hex(&xor_distance(&c.node.id, &target)),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No contacts known");
    }
    for (i, entry) in entries.iter().enumerate() {
        println!("{:2}. {}  distance {}", i + 1, entry.node, entry.distance);
    }

    Ok(())
}
