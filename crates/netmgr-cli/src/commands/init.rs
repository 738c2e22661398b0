//! `netmgr init`: write a default node configuration.

use clap::Args;
use netmgr_node::NetmgrConfig;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Directory to initialize (defaults to current directory).
    #[arg(default_value = ".")]
    pub dir: PathBuf,
}

pub fn run(args: &InitArgs) -> anyhow::Result<()> {
    let config_path = args.dir.join("netmgr.toml");

    if config_path.exists() {
        anyhow::bail!("configuration file already exists at {}", config_path.display());
    }

    let mut config = NetmgrConfig::default();
    config.storage.data_dir = args.dir.join("data");
    config.save(&config_path)?;
    std::fs::create_dir_all(&config.storage.data_dir)?;

    println!("Initialized netmgr node at {}", config_path.display());
    println!("Add [[seeds]] entries to bootstrap discovery.");
    println!("Run 'netmgr-node --config {}' to start the node.", config_path.display());

    Ok(())
}
