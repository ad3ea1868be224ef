//! Inspect and control the USB gadget composition of a modem platform.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::{
    io::{self, Error, ErrorKind, Result},
    path::PathBuf,
    process::ExitCode,
};

use gadget_hal::{
    composition::{plan, Plan},
    properties::{CONTROLLER, PERSIST_CONTROLLER},
    select_id, udcs_at, AndroidProperties, ConfigFsGadget, Functions, Gadget, Properties, Settings,
};

mod config;
use config::{Config, DEFAULT_GADGET_NAME};

#[derive(Parser)]
#[command(name = "gadget-hal", version, about = "USB gadget composition controller")]
struct Args {
    /// Configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Command.
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print the modem topology of the platform.
    Classify,
    /// Print the composition that would be built for the specified functions.
    Plan {
        /// Functions, e.g. `adb,mtp` or `none`.
        functions: Functions,
        /// Vendor composition replacing the debug bridge default composition.
        #[arg(long)]
        vendor_config: Option<String>,
    },
    /// Pull the gadget down.
    Reset,
    /// List the USB device controllers (UDCs).
    Udcs,
    /// Generate shell completions.
    Completions {
        /// Shell.
        shell: Shell,
    },
}

fn main() -> ExitCode {
    env_logger::init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let props: Box<dyn Properties> = if config.android_properties {
        Box::new(AndroidProperties)
    } else {
        Box::new(config.memory_properties())
    };

    match args.cmd {
        Cmd::Classify => println!("{}", config.classifier().classify()),
        Cmd::Plan { functions, vendor_config } => {
            let mut settings = Settings::load(&*props);
            if vendor_config.is_some() {
                settings.vendor_config = vendor_config;
            }
            print_plan(&config, &*props, functions, &settings)?;
        }
        Cmd::Reset => {
            let gadget = match &config.gadget_dir {
                Some(dir) => ConfigFsGadget::new(dir),
                None => ConfigFsGadget::open(DEFAULT_GADGET_NAME)?,
            };
            gadget.pull_down()?;
            println!("gadget {} pulled down", gadget.path().display());
        }
        Cmd::Udcs => {
            for udc in udcs_at(&config.udc_class_dir)? {
                let state = udc.state().map(|s| s.to_string()).unwrap_or_else(|err| format!("({err})"));
                let function = udc.function().ok().flatten().unwrap_or_else(|| "-".to_string());
                println!("{}\t{state}\t{function}", udc.name());
            }
        }
        Cmd::Completions { shell } => {
            clap_complete::generate(shell, &mut Args::command(), "gadget-hal", &mut io::stdout())
        }
    }

    Ok(())
}

fn print_plan(config: &Config, props: &dyn Properties, functions: Functions, settings: &Settings) -> Result<()> {
    if functions.is_empty() {
        println!("functions: none (gadget stays pulled down)");
        return Ok(());
    }

    let id = select_id(functions).map_err(|err| Error::new(ErrorKind::InvalidInput, err))?;
    let topology = config.classifier().classify();

    println!("functions:  {functions}");
    println!("topology:   {topology}");
    println!("controller: {}", controller(config, props).unwrap_or_else(|| "(not defined)".to_string()));

    match plan(functions, topology, settings) {
        Plan::VendorOverride(vendor_config) => {
            println!("identity:   {id}");
            println!("vendor composition {vendor_config}");
        }
        Plan::Compose(comp) => {
            println!("identity:   {}", comp.id.unwrap_or(id));
            for (index, function) in comp.functions().enumerate() {
                println!("function{index:<3} {function}");
            }
            println!("userspace:  {}", if comp.needs_userspace() { "monitored pull-up" } else { "direct pull-up" });
        }
    }

    Ok(())
}

/// USB device controller (UDC) name: persistent property, then property, then first UDC present.
fn controller(config: &Config, props: &dyn Properties) -> Option<String> {
    props
        .get(PERSIST_CONTROLLER)
        .or_else(|| props.get(CONTROLLER))
        .or_else(|| udcs_at(&config.udc_class_dir).ok()?.into_iter().next().map(|udc| udc.name()))
}
