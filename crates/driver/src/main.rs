mod self_test;
mod settings;

use crate::self_test::self_test;
use crate::settings::Settings;
use anyhow::{Context, anyhow};
use apc_library::link::LinkOptions;
use apc_library::{Animation, Color, Controller, ControllerOptions, InputEvent, list_ports};
use clap::Parser;
use config::{Config, Environment};

#[derive(Parser, Debug)]
#[clap(
    name = "APC mini mk2 LED driver",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
)]
struct Args {
    #[clap(short, long, help = "Config file (TOML); APC_* environment variables override it")]
    config: Option<String>,

    #[clap(short, long, help = "List MIDI ports and exit")]
    list_ports: bool,

    #[clap(short, long, help = "Animation to run, e.g. rainbow or color-wipe")]
    animation: Option<String>,

    #[clap(long, help = "Paint every pad with this color, e.g. RED or light-blue")]
    color: Option<String>,

    #[clap(long, help = "Skip the startup light sweep")]
    no_self_test: bool,
}

fn load_settings(path: Option<&str>) -> anyhow::Result<Settings> {
    let mut cfg = Config::builder();

    if let Some(config_fn) = path {
        cfg = cfg.add_source(config::File::with_name(config_fn));
    }
    cfg = cfg.add_source(Environment::with_prefix("APC").try_parsing(true));

    let settings: Settings = cfg
        .build()
        .context("Can't create settings")?
        .try_deserialize()
        .context("Can't parse settings")?;
    settings.validate().map_err(|e| anyhow!(e))?;
    Ok(settings)
}

fn print_ports(client_name: &str) -> anyhow::Result<()> {
    let ports = list_ports(client_name)?;
    println!("MIDI inputs:");
    for name in &ports.inputs {
        println!("  {name}");
    }
    println!("MIDI outputs:");
    for name in &ports.outputs {
        println!("  {name}");
    }
    Ok(())
}

fn log_event(event: &InputEvent) {
    match event.address {
        Some(address) => log::info!("{address} {:?} (velocity {})", event.kind, event.velocity),
        None => log::debug!("Unmapped note {} {:?}", event.note, event.kind),
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let settings = load_settings(args.config.as_deref())?;
    log::debug!("Running with settings: {settings:?}");

    if args.list_ports {
        return print_ports(&settings.client_name);
    }

    // Reject bad names before touching the device
    let animation = args
        .animation
        .as_deref()
        .map(str::parse::<Animation>)
        .transpose()?;
    let color = args.color.as_deref().map(str::parse::<Color>).transpose()?;

    let options = ControllerOptions {
        link: LinkOptions {
            client_name: settings.client_name.clone(),
            queue_capacity: settings.queue_capacity,
            ..LinkOptions::default()
        },
        stop_timeout: settings.stop_timeout(),
    };
    let controller = Controller::open(
        &settings.input_port,
        &settings.output_port,
        settings.passthrough(),
        options,
    )
    .with_context(|| format!("Couldn't open {:?}", settings.output_port))?;

    if settings.self_test && !args.no_self_test {
        self_test(&controller).context("Self test failed")?;
    }

    let (selection_color, selection_channel) = settings.selection().map_err(|e| anyhow!(e))?;
    controller.set_selection(selection_color, selection_channel)?;
    for behavior in &settings.behaviors {
        let (address, config) = behavior.resolve().map_err(|e| anyhow!(e))?;
        controller.configure_behavior(address, Some(config))?;
        controller.arm(address)?;
    }

    controller.register_input_observer(log_event);

    if let Some(color) = color {
        controller.set_all_pads(color, 6)?;
    }
    if let Some(animation) = animation {
        controller.start_animation(animation)?;
    }

    log::info!("Surface ready, press Enter to quit");
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;

    controller.stop_animation();
    if let Err(e) = controller.clear_all() {
        log::warn!("Couldn't clear the surface: {e}");
    }
    controller.teardown();

    Ok(())
}
