use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Builder;
use log::LevelFilter;
use std::path::PathBuf;
use std::time::Duration;

use petri_runtime::structures::{modulo_counter, toggle_switch};
use petri_runtime::{NetConfig, PetriNet};

/// Runs small Petri nets to completion and prints their final state
#[derive(Parser)]
#[command(name = "petri-runtime")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML file with the net configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log more (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Pretty-print the JSON snapshot
    #[arg(short, long)]
    pretty: bool,

    /// Print the final net as graphviz instead of JSON
    #[cfg(feature = "export_dot")]
    #[arg(long)]
    dot: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// P1 and P2 feed a single transition into an alert place
    Trigger,
    /// Flip a toggle switch a number of times
    Toggle {
        #[arg(short, long, default_value_t = 4)]
        times: u32,
    },
    /// Count input tokens modulo N
    Counter {
        #[arg(short, long, default_value_t = 4)]
        modulo: u64,
        #[arg(short, long, default_value_t = 10)]
        inputs: u32,
    },
    /// Two transitions passing tokens around a cycle
    Cycle {
        /// Tokens initially in P1, as a power of two
        #[arg(short, long, default_value_t = 16)]
        exponent: u32,
    },
}

const SETTLE_TIMEOUT: Duration = Duration::from_secs(60);

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    Builder::new().filter_level(level).init();

    let config = match &cli.config {
        Some(path) => NetConfig::load_from_file(path)?,
        None => NetConfig::default(),
    };

    let net = match cli.command {
        Commands::Trigger => run_trigger(config)?,
        Commands::Toggle { times } => run_toggle(config, times)?,
        Commands::Counter { modulo, inputs } => run_counter(config, modulo, inputs)?,
        Commands::Cycle { exponent } => run_cycle(config, exponent)?,
    };

    let snapshot = net.snapshot();

    #[cfg(feature = "export_dot")]
    if cli.dot {
        println!("{}", snapshot.get_dot_string(None));
        return Ok(());
    }

    let json = if cli.pretty {
        serde_json::to_string_pretty(&snapshot)
    } else {
        serde_json::to_string(&snapshot)
    }
    .context("Serializing the net snapshot")?;
    println!("{}", json);

    Ok(())
}

fn run_trigger(config: NetConfig) -> Result<PetriNet> {
    let mut net = PetriNet::with_config("trigger", config);
    let p1 = net.new_place("P1");
    let p2 = net.new_place("P2");
    let t = net.new_transition("T");
    let end = net.new_sink_place("PEnd");
    end.set_alert_at_least(1);
    p1.connect_to(&t, 1)?;
    p2.connect_to(&t, 2)?;
    t.connect_to(&end, 1)?;

    net.start()?;
    p1.add_tokens(1);
    p2.add_tokens(2);
    if !end.wait_for_alert_timeout(SETTLE_TIMEOUT) {
        bail!("PEnd never received a token");
    }
    net.stop()?;

    Ok(net)
}

fn run_toggle(config: NetConfig, times: u32) -> Result<PetriNet> {
    let mut net = PetriNet::with_config("toggle", config);
    let switch = toggle_switch(&mut net, "toggle")?;
    switch.input.set_alert_on_change();

    net.start()?;
    for _ in 0..times {
        switch.input.add_tokens(1);
        // One alert for the token arriving, one for it being consumed.
        while switch.input.tokens() != 0 {
            if !switch.input.wait_for_alert_timeout(SETTLE_TIMEOUT) {
                bail!("the toggle switch stopped reacting");
            }
        }
        log::info!("switch output holds {} token(s)", switch.output.tokens());
    }
    net.stop()?;

    Ok(net)
}

fn run_counter(config: NetConfig, modulo: u64, inputs: u32) -> Result<PetriNet> {
    if modulo < 2 {
        bail!("the counter needs a modulo of at least 2");
    }

    let mut net = PetriNet::with_config("counter", config);
    let counter = modulo_counter(&mut net, "counter", modulo)?;
    counter.input.set_alert_on_change();

    net.start()?;
    for _ in 0..inputs {
        counter.input.add_tokens(1);
        while counter.input.tokens() != 0 {
            if !counter.input.wait_for_alert_timeout(SETTLE_TIMEOUT) {
                bail!("the counter stopped reacting");
            }
        }
        log::info!("counter is at {}", counter.count.tokens());
    }
    net.stop()?;

    Ok(net)
}

fn run_cycle(config: NetConfig, exponent: u32) -> Result<PetriNet> {
    if exponent == 0 || exponent > 24 {
        bail!("exponent must be between 1 and 24");
    }
    let tokens = 1u64 << exponent;

    let mut net = PetriNet::with_config("cycle", config);
    let p1 = net.new_place("P1");
    let p2 = net.new_place("P2");
    let t1 = net.new_transition("T1");
    let t2 = net.new_transition("T2");
    let fired = net.new_sink_place("Fired");
    p1.connect_to(&t1, 1)?;
    t1.connect_to(&p2, 1)?;
    p2.connect_to(&t2, 2)?;
    t2.connect_to(&p1, 1)?;
    t2.connect_to(&fired, 1)?;
    fired.set_alert_at_least(tokens - 1);

    p1.add_tokens(tokens as i64);
    net.start()?;
    if !fired.wait_for_alert_timeout(SETTLE_TIMEOUT) {
        bail!("the cycle stalled after {} firings", fired.tokens());
    }
    net.stop()?;

    Ok(net)
}
