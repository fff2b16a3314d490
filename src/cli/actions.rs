use anyhow::{anyhow, Context, Result};
use clap::ArgMatches;
use flume::Sender;
use std::{
    io::BufRead,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use crate::{
    core::{CycleController, LifecycleState, RigConfig, SessionError, SessionUpdate},
    protocol::SystemConnector,
    utils::ports::{enumerate_ports, SystemPortEnumerator},
};

/// Commands typed by the operator while a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    TogglePause,
    RequestCancel,
    ConfirmCancel,
    DeclineCancel,
    /// Ctrl-C: cancel without asking
    Abort,
}

/// How a job run from the command line ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Cancelled,
    ConnectionLost,
}

pub fn parse_command(line: &str) -> Option<UserCommand> {
    match line.trim().to_lowercase().as_str() {
        "p" | "pause" | "resume" => Some(UserCommand::TogglePause),
        "c" | "cancel" => Some(UserCommand::RequestCancel),
        "y" | "yes" => Some(UserCommand::ConfirmCancel),
        "n" | "no" => Some(UserCommand::DeclineCancel),
        _ => None,
    }
}

/// Print the ports found by one enumeration.
pub fn list_ports(json: bool) -> Result<()> {
    let ports = enumerate_ports()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
    } else if ports.is_empty() {
        println!("No serial ports found");
    } else {
        for port in ports {
            println!("{}\t{}", port.port_name, port.port_type);
        }
    }
    Ok(())
}

pub fn load_config(matches: &ArgMatches) -> Result<RigConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => RigConfig::load(path)?,
        None => RigConfig::default(),
    };
    if let Some(baud) = matches.get_one::<u32>("baud-rate") {
        config.serial.baud_rate = *baud;
    }
    if let Some(interval) = matches.get_one::<u64>("poll-interval-ms") {
        config.discovery.poll_interval_ms = *interval;
    }
    Ok(config)
}

/// Run one job to completion or cancellation, reporting progress on stdout.
pub fn run_job(matches: &ArgMatches) -> Result<JobOutcome> {
    let config = load_config(matches)?;
    let json = matches.get_flag("json");
    let baseline_wait = config.poll_interval() * 2 + Duration::from_millis(500);
    let (mut controller, updates) = CycleController::new(
        config,
        Arc::new(SystemPortEnumerator),
        Arc::new(SystemConnector),
    );

    // Give discovery one poll so a default port can be picked
    let deadline = Instant::now() + baseline_wait;
    while controller.known_ports().is_empty() && Instant::now() < deadline {
        controller.wait_and_process(Duration::from_millis(100));
    }

    if let Some(port) = matches.get_one::<String>("port") {
        controller.select_port(port)?;
    }
    let cycles = matches
        .get_one::<u8>("cycles")
        .copied()
        .ok_or_else(|| anyhow!("--cycles is required"))?;
    controller.adjust_target(i32::from(cycles))?;

    for update in updates.try_iter() {
        log::debug!("{update:?}");
    }

    controller.start().context("failed to start job")?;
    if !json {
        println!(
            "Running {} cycles on {} (p: pause/resume, c: cancel)",
            controller.session().target_count(),
            controller.selected_port().unwrap_or_default()
        );
    }

    let (input_tx, input_rx) = flume::unbounded();
    spawn_stdin_reader(input_tx.clone());
    let abort_tx = input_tx;
    if let Err(err) = ctrlc::set_handler(move || {
        let _ = abort_tx.send(UserCommand::Abort);
    }) {
        log::warn!("Failed to install Ctrl-C handler: {err}");
    }

    let mut outcome = JobOutcome::Cancelled;
    loop {
        controller.wait_and_process(Duration::from_millis(100));

        while let Ok(command) = input_rx.try_recv() {
            if let Err(err) = apply_command(&mut controller, command) {
                println!("{err}");
            }
        }

        for update in updates.try_iter() {
            match &update {
                SessionUpdate::StateChanged {
                    state: LifecycleState::Completed,
                } => outcome = JobOutcome::Completed,
                SessionUpdate::Notice {
                    error: SessionError::ConnectionLost { .. },
                } => outcome = JobOutcome::ConnectionLost,
                _ => {}
            }
            if json {
                println!("{}", serde_json::to_string(&update)?);
            } else {
                render(&update);
            }
        }

        if controller.state() == LifecycleState::Idle {
            break;
        }
    }

    Ok(outcome)
}

fn apply_command(
    controller: &mut CycleController,
    command: UserCommand,
) -> std::result::Result<(), SessionError> {
    match command {
        UserCommand::TogglePause => controller.toggle_pause().map(|_| ()),
        UserCommand::RequestCancel => controller.request_cancel(),
        UserCommand::ConfirmCancel => controller.confirm_cancel(),
        UserCommand::DeclineCancel => controller.decline_cancel(),
        UserCommand::Abort => {
            controller.request_cancel()?;
            controller.confirm_cancel()
        }
    }
}

fn render(update: &SessionUpdate) {
    match update {
        SessionUpdate::Progress(progress) => println!(
            "Cycles done: {}/{} ({}%)",
            progress.done, progress.target, progress.percent
        ),
        SessionUpdate::StateChanged { state } => match state {
            LifecycleState::Cancelling => println!("Cancel the job? [y/n]"),
            LifecycleState::Completed => println!("All cycles done"),
            LifecycleState::Idle => println!("Job finished"),
            LifecycleState::Running => println!("Running"),
        },
        SessionUpdate::PauseChanged { paused } => {
            println!("{}", if *paused { "Paused" } else { "Resumed" })
        }
        SessionUpdate::DeviceMessage { line } => println!("device: {line}"),
        SessionUpdate::Notice { error } => eprintln!("Error: {error}"),
        other => log::debug!("{other:?}"),
    }
}

fn spawn_stdin_reader(tx: Sender<UserCommand>) {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match parse_command(&line) {
                Some(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => println!("Unknown command {:?} (p, c, y, n)", line.trim()),
            }
        }
    });
}
