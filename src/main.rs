/*
 ═══════════════════════════════════════════════════════════════════════════════
  SENTINEL SHIELD - DELEGATECALL Surface Scanner

  Enumerates every DELEGATECALL instruction in EVM bytecode, recovers the
  symbolic target address via a small abstract interpreter, classifies it,
  detects well-known proxy patterns, and scores the overall risk.
 ═══════════════════════════════════════════════════════════════════════════════
*/

use clap::Parser;

mod server;

use delegatecall_scanner::{analyze, AnalyzeOptions};

// ═══════════════════════════════════════════════════════════════════════════════
//                              CLI ARGUMENTS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Parser, Debug)]
#[command(name = "delegatecall-scanner")]
#[command(author = "SENTINEL Team")]
#[command(version = "1.0.0")]
#[command(about = "Static analyzer for the DELEGATECALL surface of EVM bytecode")]
struct Args {
    /// Bytecode hex string (with or without 0x prefix)
    #[arg(short, long)]
    bytecode: Option<String>,

    /// Contract address to fetch bytecode for, via RPC
    #[arg(short, long)]
    address: Option<String>,

    /// Network to query (mainnet, arbitrum-one, etc.)
    #[arg(short, long, default_value = "mainnet")]
    network: String,

    /// Explicit JSON-RPC endpoint (overrides RPC_URL_* environment variables)
    #[arg(long)]
    rpc_url: Option<String>,

    /// Emit the report as JSON instead of a human-readable summary
    #[arg(long)]
    json: bool,

    /// Skip CFG construction and trace the instruction stream linearly
    #[arg(long)]
    use_linear: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Run as HTTP server
    #[arg(long)]
    server: bool,

    /// Port for HTTP server (default: 3000)
    #[arg(short, long, default_value = "3000")]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.verbose {
        tracing_subscriber::fmt().with_env_filter("debug").init();
    }

    if args.server {
        server::run_server(args.port).await?;
        return Ok(());
    }

    let bytecode = match (&args.bytecode, &args.address) {
        (Some(hex_str), _) => hex_str.clone(),
        (None, Some(address)) => {
            match delegatecall_scanner::fetch::fetch_code(address, &args.network, args.rpc_url.as_deref())
                .await
            {
                Ok(code) => code,
                Err(e) => {
                    eprintln!("Analysis failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        (None, None) => {
            eprintln!("Provide --bytecode or --address, or use --server mode");
            std::process::exit(1);
        }
    };

    let options = AnalyzeOptions {
        contract_address: args.address.clone(),
        network: Some(args.network.clone()),
        use_cfg: !args.use_linear,
    };

    let report = match analyze(&bytecode, &options) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Analysis failed: {e}");
            std::process::exit(1);
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    Ok(())
}

fn print_summary(report: &delegatecall_scanner::Report) {
    println!("Bytecode hash:      {}", report.bytecode_hash);
    println!("DELEGATECALL sites: {}", report.delegatecall_count);
    match &report.overall_risk {
        Some(risk) => println!("Overall risk:       {risk:?}"),
        None => println!("Overall risk:       (no sites)"),
    }

    if !report.proxies_detected.is_empty() {
        println!("\nProxy patterns detected:");
        for proxy in &report.proxies_detected {
            println!("  {} x{}", proxy.name, proxy.count);
        }
    }

    if !report.sites.is_empty() {
        println!("\nSites:");
        for site in &report.sites {
            let pattern = site
                .pattern
                .as_ref()
                .map(|p| p.name.as_str())
                .unwrap_or("-");
            println!(
                "  pc={:<6} type={:<10} risk={:<8} pattern={}",
                site.pc,
                format!("{:?}", site.classification.kind),
                format!("{:?}", site.risk),
                pattern,
            );
        }
    }
}
