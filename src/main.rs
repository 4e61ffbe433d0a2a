extern crate clap;
extern crate judge_core;

use std::path::PathBuf;
use std::process::exit;

use error_chain::ChainedError;

fn get_arg_matches() -> clap::ArgMatches<'static> {
    clap::App::new("judge-core")
        .version("0.1.0")
        .author("Lancern <msrlancern@126.com>")
        .about("Runs a compiled program against a suite of test cases inside an isolated sandbox.")
        .arg(clap::Arg::with_name("policy")
            .long("policy")
            .takes_value(true)
            .value_name("FILE")
            .default_value("limits.json")
            .help("path to the resource policy file"))
        .arg(clap::Arg::with_name("stdin_dir")
            .long("stdin-dir")
            .takes_value(true)
            .value_name("DIR")
            .default_value("stdin")
            .help("directory of <name>.in case inputs"))
        .arg(clap::Arg::with_name("stdout_dir")
            .long("stdout-dir")
            .takes_value(true)
            .value_name("DIR")
            .default_value("stdout")
            .help("directory to receive <name>.out captures"))
        .arg(clap::Arg::with_name("sandbox_dir")
            .long("sandbox-dir")
            .takes_value(true)
            .value_name("DIR")
            .default_value("sandbox")
            .help("sandbox root, created and destroyed for this run"))
        .arg(clap::Arg::with_name("program")
            .long("program")
            .takes_value(true)
            .value_name("FILE")
            .default_value("./test")
            .help("path to the compiled program to judge"))
        .arg(clap::Arg::with_name("result")
            .long("result")
            .takes_value(true)
            .value_name("FILE")
            .default_value("execute_message.json")
            .help("path of the result artifact to write"))
        .arg(clap::Arg::with_name("verbose")
            .short("v")
            .long("verbose")
            .multiple(true)
            .help("increase logging verbosity; may be repeated"))
        .get_matches()
}

fn do_main() -> judge_core::Result<()> {
    let matches = get_arg_matches();

    stderrlog::new()
        .module(module_path!())
        .verbosity(matches.occurrences_of("verbose") as usize + 1)
        .init()
        .expect("failed to initialize logging");

    let policy_path = PathBuf::from(matches.value_of("policy").unwrap());
    let stdin_dir = PathBuf::from(matches.value_of("stdin_dir").unwrap());
    let stdout_dir = PathBuf::from(matches.value_of("stdout_dir").unwrap());
    let sandbox_dir = PathBuf::from(matches.value_of("sandbox_dir").unwrap());
    let program = PathBuf::from(matches.value_of("program").unwrap());
    let result_path = PathBuf::from(matches.value_of("result").unwrap());

    let records = judge_core::execute(
        &policy_path, &sandbox_dir, &program, &stdin_dir, &stdout_dir, &result_path)?;

    log::info!("judged {} case(s); result written to {}", records.len(), result_path.display());

    Ok(())
}

fn main() {
    if let Err(e) = do_main() {
        eprintln!("error: {}", e.display_chain().to_string());
        exit(1);
    }
}
