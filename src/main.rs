use cyclerig::cli::{self, actions::JobOutcome};

fn main() -> anyhow::Result<()> {
    cyclerig::boot::init_common();
    let matches = cli::parse_args();

    if matches.get_flag("list-ports") {
        return cli::actions::list_ports(matches.get_flag("json"));
    }

    match cli::actions::run_job(&matches)? {
        JobOutcome::Completed => log::info!("Job completed"),
        JobOutcome::Cancelled => log::info!("Job cancelled"),
        JobOutcome::ConnectionLost => std::process::exit(2),
    }
    Ok(())
}
