use std::process;

use routesync_lib::config::{self, Config};
use routesync_lib::route::sort_by_mask;
use routesync_lib::route_ops::RouteOps;
use routesync_lib::{Reconciler, RouteSpec, logging};

use crate::cli::Command;

mod cli;

// Avoid musl's default allocator due to degraded performance
// https://nickb.dev/blog/default-musl-allocator-considered-harmful-to-performance
#[cfg(target_os = "linux")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

async fn load_config(args: &cli::Cli) -> Result<Config, exitcode::ExitCode> {
    config::read(&args.config_path).await.map_err(|err| {
        tracing::error!(error = %err, path = %args.config_path.display(), "unable to read configuration");
        match err {
            config::Error::NoFile => exitcode::NOINPUT,
            config::Error::IO(_) => exitcode::IOERR,
            _ => exitcode::CONFIG,
        }
    })
}

fn show(routes: &mut [RouteSpec]) {
    sort_by_mask(routes);
    for route in routes.iter() {
        println!("{}", route.to_ip_command(route.device()).join(" "));
    }
}

async fn apply<R: RouteOps>(reconciler: &Reconciler<R>, routes: &mut [RouteSpec]) -> Result<(), exitcode::ExitCode> {
    let outcomes = reconciler.replace_routes(routes).await.map_err(|err| {
        tracing::error!(error = %err, phase = %err.phase(), "aborting route installation");
        exitcode::UNAVAILABLE
    })?;
    let changed = outcomes.iter().filter(|o| o.is_changed()).count();
    tracing::info!(total = outcomes.len(), %changed, "routes applied");
    Ok(())
}

async fn delete<R: RouteOps>(
    reconciler: &Reconciler<R>,
    routes: &[RouteSpec],
    with_nexthop: bool,
) -> Result<(), exitcode::ExitCode> {
    let errors = reconciler.delete_routes(routes, with_nexthop).await;
    for error in errors.iter() {
        tracing::warn!(%error, phase = %error.phase(), "failed to delete {}, continuing anyway", error.route());
    }

    if !errors.is_empty() {
        tracing::error!(failed = errors.len(), "route teardown incomplete");
        return Err(exitcode::UNAVAILABLE);
    }
    tracing::info!(total = routes.len(), "routes deleted");
    Ok(())
}

async fn run(args: cli::Cli) -> Result<(), exitcode::ExitCode> {
    let Config { mtu, mut routes } = load_config(&args).await?;

    if args.command == Command::Show {
        show(&mut routes);
        return Ok(());
    }

    cfg_if::cfg_if! {
        if #[cfg(target_os = "linux")] {
            let ops = routesync_lib::netlink_ops::NetlinkRouteOps::connect().map_err(|err| {
                tracing::error!(error = %err, "unable to open netlink connection");
                exitcode::OSERR
            })?;
            let reconciler = Reconciler::new(ops, mtu);
            match args.command {
                Command::Apply => apply(&reconciler, &mut routes).await,
                Command::Delete { with_nexthop } => delete(&reconciler, &routes, with_nexthop).await,
                Command::Show => Ok(()),
            }
        } else {
            let _ = mtu;
            tracing::error!("kernel route management is only supported on linux");
            Err(exitcode::UNAVAILABLE)
        }
    }
}

#[tokio::main]
async fn main() {
    let args = cli::parse();

    match &args.log_file {
        Some(path) => {
            if let Err(e) = logging::setup_log_file(path) {
                eprintln!("unable to open log file {}: {e}", path.display());
                process::exit(exitcode::CANTCREAT);
            }
        }
        None => logging::setup_stdout(),
    }
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting {}",
        env!("CARGO_PKG_NAME")
    );

    match run(args).await {
        Ok(_) => (),
        Err(exitcode::OK) => (),
        Err(code) => {
            tracing::warn!("abnormal exit");
            process::exit(code);
        }
    }
}
