pub mod actions;

use clap::{Arg, ArgMatches, Command};

/// Describe the command line accepted by the `cyclerig` binary.
pub fn build_command() -> Command {
    Command::new("cyclerig")
        .about("Run a counted cycle job on a serial-attached rig")
        .arg(
            Arg::new("list-ports")
                .long("list-ports")
                .short('l')
                .help("List all available serial ports and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .short('j')
                .help("Output in JSON format (one JSON line per update while a job runs)")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .short('p')
                .help("Serial port the rig is attached to (default: first discovered port)")
                .value_name("PORT"),
        )
        .arg(
            Arg::new("cycles")
                .long("cycles")
                .short('n')
                .help("Number of cycles to run (saturates at 99)")
                .value_name("N")
                .required_unless_present("list-ports")
                .value_parser(clap::value_parser!(u8)),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .help("TOML configuration file")
                .value_name("PATH"),
        )
        .arg(
            Arg::new("baud-rate")
                .long("baud-rate")
                .help("Serial port baud rate (overrides the config file)")
                .value_name("BAUD")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("poll-interval-ms")
                .long("poll-interval-ms")
                .help("Port discovery interval in milliseconds (overrides the config file)")
                .value_name("MS")
                .value_parser(clap::value_parser!(u64)),
        )
}

/// Parse command line arguments and return ArgMatches.
pub fn parse_args() -> ArgMatches {
    build_command().get_matches()
}
