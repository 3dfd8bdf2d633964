use std::error::Error;

use azurerm_driver::commands::create::CreateCommand;
use azurerm_driver::commands::destroy::DestroyCommand;
use azurerm_driver::driver::{AzureClientFactory, Driver};
use azurerm_driver::parameters::{Commands, DriverArgs, LogLevel};
use azurerm_driver::template::FileTemplateRenderer;
use clap::Parser;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(name = "azurerm-driver-cli")]
struct Cli {
    /// Most verbose level of the logs written to stderr
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

fn driver(args: &DriverArgs) -> Result<Driver<AzureClientFactory, FileTemplateRenderer>, Box<dyn Error>> {
    let config = args.driver_config()?;
    let http_config = args.http_config()?;
    Ok(Driver::new(
        config,
        args.transport(),
        AzureClientFactory::new(http_config),
        FileTemplateRenderer::new(args.templates_dir()),
    ))
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(Level::from(cli.log_level))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Create(args) => {
            let state = CreateCommand::new(driver(&args)?, args.state_path()).execute()?;
            println!("{}", state.hostname.unwrap_or_default());
        }
        Commands::Destroy(args) => {
            DestroyCommand::new(driver(&args)?, args.state_path()).execute()?;
        }
    }
    Ok(())
}
