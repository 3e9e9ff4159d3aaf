use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use dotenv::dotenv;
use tracing_subscriber::EnvFilter;

use ftpwatch::config::{Args, Config};
use ftpwatch::{sniff, LoginStore, Monitor};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if args.list_interfaces {
        for (i, device) in sniff::list_devices()?.iter().enumerate() {
            let desc = device.desc.as_deref().unwrap_or("No description available");
            println!("{}. {} ({})", i + 1, device.name, desc);
        }
        return Ok(());
    }

    let watch = args.watch.ok_or("--watch is required")?;
    let config = Config::from_args(args, watch)?;

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();
    ctrlc::set_handler(move || running_clone.store(false, Ordering::SeqCst))?;

    let mut capture = sniff::open(&config)?;
    println!("\nlistening on {}...", capture.description());
    tracing::info!(
        device = capture.device_name(),
        watch = %config.watch_addr,
        report = %config.report_addr,
        log = %config.log_path.display(),
        "capture started"
    );

    let store = LoginStore::new(&config.log_path).with_json_log(config.json_log.clone());
    let mut monitor = Monitor::new(&config, store);
    let result = sniff::run(&mut capture, &mut monitor, &running);

    print!("{}", monitor.flows().summary());
    tracing::info!(stats = ?monitor.stats(), "capture stopped");
    result?;
    Ok(())
}
