//! cosim-bridge entry point: CLI wiring, configuration loading and the demo run.

use std::process;

use cosim_bridge::cli::{parse_args, print_usage};
use cosim_bridge::config::CosimConfig;
use cosim_bridge::fmi::native::NativeProvider;
use cosim_bridge::host::demo::{DemoBuilding, run};
use cosim_bridge::io::export::export_csv;
use cosim_bridge::stepper::CoSimulationContext;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opts = match parse_args() {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("error: {e}");
            print_usage();
            process::exit(2);
        }
    };
    if opts.help {
        print_usage();
        return;
    }

    let config = match opts.config.as_deref() {
        Some(path) => match CosimConfig::from_toml_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                log::error!("{e}");
                process::exit(1);
            }
        },
        None => CosimConfig::default(),
    };

    let mut building = DemoBuilding::from_config(&config);
    let mut ctx = match CoSimulationContext::new(config, Box::new(NativeProvider)) {
        Ok(ctx) => ctx,
        Err(e) => {
            log::error!("{e}");
            process::exit(1);
        }
    };

    let summary = match run(&mut building, &mut ctx) {
        Ok(summary) => summary,
        Err(e) => {
            log::error!("simulation terminated: {e}");
            process::exit(1);
        }
    };
    log::info!(
        "simulated {} steps ({} coupled); final zone temperature {:.2} C, run-period mean {:.2} C",
        summary.steps,
        summary.coupled_ticks,
        summary.final_zone_c,
        summary.mean_run_zone_c
    );

    if let Some(path) = opts.telemetry_out.as_deref() {
        if !ctx.config().interface.trace_exchanges {
            log::warn!("interface.trace_exchanges is off; the telemetry file only has a header");
        }
        if let Err(e) = export_csv(ctx.records(), path) {
            log::error!("cannot write telemetry to \"{}\": {e}", path.display());
            process::exit(1);
        }
        log::info!("telemetry written to {}", path.display());
    }
}
