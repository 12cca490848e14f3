//! nandway - raw NAND flasher for the NANDway Teensy bridge
//!
//! Dumps, programs and selectively reprograms 8-bit NAND chips attached to
//! a Teensy++ running the NANDway firmware. The chip geometry is read from
//! the chip itself, so no chip database is needed.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands, ProgramArgs};
use nandway_core::flash::{FailurePolicy, NandDevice, ProgramOptions};
use nandway_teensy::{open_serial, SerialConfig, SessionConfig};
use std::time::Instant;

fn main() {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn program<D: NandDevice>(
    device: &mut D,
    args: &ProgramArgs,
    verify: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let options = ProgramOptions {
        verify,
        on_failure: if args.abort_on_error {
            FailurePolicy::Abort
        } else {
            FailurePolicy::Continue
        },
    };
    commands::run_write(
        device,
        &args.input,
        args.offset.unwrap_or(0),
        args.length.unwrap_or(0),
        options,
    )
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    // The bad-block scan works on a file and needs no bridge
    if let Commands::Ps3badblocks { input } = &cli.command {
        return commands::run_ps3badblocks(input);
    }

    let serial = SerialConfig {
        baud: cli.baud,
        ..SerialConfig::new(cli.port.as_str())
    };
    let config = SessionConfig {
        chip_select: cli.nand,
        pullups: !cli.no_pullups,
        firmware: cli.firmware,
    };

    println!("Pinging Teensy...");
    let bridge = open_serial(&serial, config)?;
    println!("Available memory: {} bytes", bridge.firmware().free_memory);
    println!();

    if let Commands::Bootloader = cli.command {
        println!("Entering Teensy's bootloader mode... Goodbye!");
        bridge.enter_bootloader()?;
        return Ok(());
    }

    let firmware = *bridge.firmware();
    let mut session = bridge.identify()?;
    commands::print_info(&session, cli.nand.index(), &firmware);

    let start = Instant::now();
    match cli.command {
        Commands::Info => {}
        Commands::Dump {
            output,
            offset,
            length,
        } => commands::run_dump(
            &mut session,
            &output,
            offset.unwrap_or(0),
            length.unwrap_or(0),
        )?,
        Commands::Write(args) => program(&mut session, &args, false)?,
        Commands::Vwrite(args) => program(&mut session, &args, true)?,
        Commands::Diffwrite { input, diff } => {
            commands::run_diffwrite(&mut session, &input, &diff, false)?
        }
        Commands::Vdiffwrite { input, diff } => {
            commands::run_diffwrite(&mut session, &input, &diff, true)?
        }
        // Handled before identify
        Commands::Bootloader | Commands::Ps3badblocks { .. } => {}
    }

    if start.elapsed().as_secs() > 0 {
        println!("Done. [{:.1?}]", start.elapsed());
    }

    // Make sure the bridge survived the command
    session.ping()?;
    session.close();
    Ok(())
}
