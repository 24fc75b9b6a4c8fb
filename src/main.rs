//! # Arkade CLI
//!
//! Command line access to the Arkade script tooling and the round coordinator.
//!
//! ## Usage
//!
//! ```bash
//! # ASM to wire bytes and back
//! arkade encode "OP_INSPECTNUMOUTPUTS OP_2 OP_EQUAL"
//! arkade decode d45287
//!
//! # Introspector key tweaked by an embedded script
//! arkade tweak --pubkey <hex> --script d45287
//!
//! # Enhanced leaf for a multisig template
//! arkade leaf --template '{"type":"multisig","pubkeys":["<hex>"]}' \
//!     --embedded d45287 --introspector <hex>
//!
//! # Coordinator parameters
//! arkade info
//! ```

use anyhow::{Context, Result};
use arkade::batch::ArkProvider;
use arkade::config::ClientConfig;
use arkade::script::{decode, encode, from_asm, to_asm};
use arkade::tweak::tweak_public_key;
use arkade::{ArkadeLeaf, RestArkProvider, TapscriptTemplate, VtxoLeaf, VtxoScriptTree};
use bitcoin::secp256k1::XOnlyPublicKey;
use clap::{Parser, Subcommand};
use log::debug;

#[derive(Parser)]
#[command(name = "arkade")]
#[command(about = "Arkade script tooling and Ark batch client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode an ASM script to hex
    Encode {
        /// Space separated ASM, e.g. "OP_DUP OP_ADD64"
        asm: String,
    },
    /// Decode a hex script to ASM
    Decode {
        /// Script bytes as hex
        hex: String,
    },
    /// Tweak a public key with the hash of an embedded script
    Tweak {
        /// Base public key, 32-byte x-only or 33-byte compressed hex
        #[arg(long)]
        pubkey: String,
        /// Embedded script hex
        #[arg(long)]
        script: String,
    },
    /// Build an enhanced tapscript leaf and its single-leaf VTXO tree
    Leaf {
        /// Template descriptor JSON
        #[arg(long)]
        template: String,
        /// Embedded script hex
        #[arg(long)]
        embedded: String,
        /// Introspector x-only public key hex
        #[arg(long)]
        introspector: String,
    },
    /// Query the round coordinator's parameters
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Encode { asm } => {
            let ops = from_asm(&asm)?;
            println!("{}", hex::encode(encode(&ops)));
        }
        Commands::Decode { hex } => {
            let bytes = decode_hex(&hex, "script")?;
            println!("{}", to_asm(&decode(&bytes)?));
        }
        Commands::Tweak { pubkey, script } => {
            let base = decode_hex(&pubkey, "public key")?;
            let script = decode_hex(&script, "script")?;
            let tweaked = tweak_public_key(&base, &script)?;
            println!("{}", tweaked);
        }
        Commands::Leaf {
            template,
            embedded,
            introspector,
        } => {
            leaf(&template, &embedded, &introspector)?;
        }
        Commands::Info => {
            info().await?;
        }
    }

    Ok(())
}

fn decode_hex(value: &str, what: &str) -> Result<Vec<u8>> {
    hex::decode(value.trim()).with_context(|| format!("invalid {} hex", what))
}

fn leaf(template: &str, embedded: &str, introspector: &str) -> Result<()> {
    let template: TapscriptTemplate =
        serde_json::from_str(template).context("invalid template descriptor")?;
    let introspector_key = XOnlyPublicKey::from_slice(&decode_hex(introspector, "introspector key")?)
        .context("invalid introspector key")?;
    let arkade_leaf = ArkadeLeaf {
        embedded_script: decode_hex(embedded, "embedded script")?,
        template,
    };

    let script = arkade_leaf.to_script(&introspector_key)?;
    debug!("Built {} leaf of {} bytes", arkade_leaf.template.kind(), script.len());
    let tree = VtxoScriptTree::build(vec![VtxoLeaf::Arkade(arkade_leaf)], &introspector_key)?;

    println!("Leaf script:   {}", hex::encode(script.as_bytes()));
    match decode(script.as_bytes()) {
        Ok(ops) => println!("Leaf ASM:      {}", to_asm(&ops)),
        Err(e) => println!("Leaf ASM:      <{}>", e),
    }
    println!("Output key:    {}", tree.output_key());
    println!("Script pubkey: {}", hex::encode(tree.script_pubkey().as_bytes()));
    Ok(())
}

async fn info() -> Result<()> {
    let config = ClientConfig::from_env();
    let provider = RestArkProvider::new(&config)?;
    let info = provider
        .get_info()
        .await
        .with_context(|| format!("failed to query {}", config.ark_server_url))?;

    println!("Ark server:      {}", config.ark_server_url);
    println!("Forfeit pubkey:  {}", info.forfeit_pubkey);
    println!("Forfeit address: {}", info.forfeit_address);
    Ok(())
}
