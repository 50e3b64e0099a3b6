use anyhow::Result;
use clap::Parser;
use labpoll_config::ConfigLoader;
use labpoll_logging::init_logging;
use labpoll_server::cli::{address, start_targets};
use labpoll_server::{App, Cli, Command};
use labpoll_types::Device;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ConfigLoader::new(&cli.config_dir).load_validated()?;
    init_logging(&config.logging)?;

    tracing::info!(config_dir = %cli.config_dir.display(), "Starting labpoll");

    match cli.command() {
        Command::PrintConfig => {
            print!("{}", config.to_toml()?);
        }
        Command::Run { start, all } => {
            let app = App::build(config).await?;
            app.run(&start_targets(&start, all), async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                }
            })
            .await?;
        }
        Command::AddDevice {
            ip,
            port,
            kind,
            label,
            refresh_rate,
        } => {
            let app = App::build(config).await?;
            let mut device = Device::new(address(ip, port), kind.into()).with_refresh_rate(refresh_rate);
            device.label = label;
            app.add_device(device).await?;
        }
        Command::RemoveDevice { ip, port } => {
            let app = App::build(config).await?;
            app.remove_device(&address(ip, port)).await?;
        }
        Command::ListDevices => {
            let app = App::build(config).await?;
            for summary in app.list_devices().await {
                println!(
                    "{}\t{}\t{}\t{}s",
                    summary.device.address,
                    summary.device.kind,
                    summary.device.display_name(),
                    summary.device.refresh_rate
                );
            }
        }
    }

    Ok(())
}
