use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use renderlink::{logging, Renderlink, RenderlinkConfig, Resource, ResourceClass, ResourceEvent};

/// List media renderers and servers announcing themselves over SSDP
///
/// Runs discovery for a while and prints every device that appears or
/// goes away.
#[derive(Parser, Debug)]
#[command(name = "renderlink-discover")]
#[command(about = "Watch SSDP for media renderers and servers")]
#[command(version)]
struct Args {
    /// How long to listen, in seconds
    #[arg(short, long, default_value = "5")]
    timeout: u64,

    /// Only show devices of this class
    #[arg(long, value_enum)]
    class: Option<ClassFilter>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ClassFilter {
    Renderer,
    Server,
}

impl ClassFilter {
    fn matches(self, resource: &Resource) -> bool {
        match self {
            ClassFilter::Renderer => resource.class == ResourceClass::Renderer,
            ClassFilter::Server => resource.class == ResourceClass::MediaServer,
        }
    }
}

fn describe(resource: &Resource) -> String {
    match &resource.label {
        Some(label) => format!("{} ({})", resource.uri, label),
        None => resource.uri.clone(),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_logging_from_env().context("Failed to set up logging")?;

    let mut link = Renderlink::new(RenderlinkConfig::default()).context("Failed to start SSDP discovery")?;
    let events = link.registry().events();

    let deadline = Instant::now() + Duration::from_secs(args.timeout);
    let idle = link.config().backend.idle_sleep;

    while Instant::now() < deadline {
        if link.tick(Instant::now()) == 0 {
            std::thread::sleep(idle);
        }

        for event in events.try_iter() {
            let resource = event.resource();
            if args.class.is_some_and(|class| !class.matches(resource)) {
                continue;
            }
            match &event {
                ResourceEvent::RemoteAdded(_) => println!("+ {}", describe(resource)),
                ResourceEvent::RemoteDeleted(_) => println!("- {}", describe(resource)),
                _ => {}
            }
        }
    }

    link.shutdown();
    Ok(())
}
