use clap::{Parser, Subcommand};
use color_eyre::Result;
use env_logger::Env;
use log::info;
use std::path::PathBuf;

use panoforge::config;
use panoforge::external::{GitCloner, ShellRunner, VarRenderer};
use panoforge::pipeline::{Pipeline, Step, StepOutcome};
use panoforge::setup::{Devnet, Genesis, Pano, ProvisionState};

/// Provisioning utility for Pano multi-node devnet deployments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the network configuration YAML file
    #[arg(short, long)]
    config: PathBuf,

    /// Override the output root directory from the configuration
    #[arg(short, long)]
    target_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Set up the genesis contracts and generate the shared genesis file,
    /// using validator addresses from the signer dump
    Genesis,
    /// Provision a single-node pano chain
    Pano,
    /// Provision a multi-node devnet
    Devnet,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    info!("Starting panoforge");
    info!("Configuration file: {:?}", args.config);

    let mut config = config::load_config(&args.config)?;
    if let Some(target_dir) = args.target_dir {
        config.target_dir = target_dir;
    }

    let runner = ShellRunner;
    let cloner = GitCloner::new(&runner);
    let renderer = VarRenderer;
    let mut state = ProvisionState::default();

    match args.command {
        Command::Genesis => {
            let devnet = Devnet::new(config.clone(), &cloner, &runner, &renderer);
            let genesis = Genesis::new(&config, &cloner, &runner);
            let genesis_path = genesis.genesis_file_path();

            let mut pipeline = Pipeline::new("genesis-stage");
            pipeline.push(Step::leaf("Collect signer accounts", |state| {
                devnet.collect_accounts(state)
            }));
            pipeline.push(Step::new("Set up genesis contracts", move |_| {
                Ok(StepOutcome::Nested(genesis.into_tasks()))
            }));
            pipeline.run(&mut state)?;

            info!("Genesis file is ready");
            println!("Pano genesis path: {}", genesis_path.display());
        }
        Command::Pano => {
            let pano = Pano::new(config, &cloner, &runner, &renderer);
            pano.tasks().run(&mut state)?;

            info!("Pano is ready");
            println!("Pano data: {}", pano.data_dir().display());
            println!("Setup pano chain: bash pano-setup.sh");
            println!("Start pano chain: bash pano-start.sh");
            println!("Clean pano chain: bash pano-clean.sh");
        }
        Command::Devnet => {
            let devnet = Devnet::new(config, &cloner, &runner, &renderer);
            devnet.tasks().run(&mut state)?;

            info!("Devnet is ready");
            println!(
                "Provisioned {} node workspaces under {}",
                devnet.config().total_nodes(),
                devnet.workspace().root().display()
            );
            if let Some(peer_set) = &state.peer_set {
                println!("Discovery peer set: {} endpoints", peer_set.len());
            }
        }
    }

    Ok(())
}
