use anyhow::{Context, Result};
use clap::{Arg, Command};
use score_cursor::script::{ScoreSetup, ScriptRunner, parse_script};
use score_cursor::types::segment_type::SegmentTypeFilter;
use score_cursor::types::signature::TimeSignature;

#[cfg(feature = "midi")]
use score_cursor::midi;

fn main() -> Result<()> {
    let matches = Command::new("score-cursor")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Builds and walks a score by running a cursor command file")
        .arg(
            Arg::new("script")
                .help("Command file to run")
                .value_name("SCRIPT_FILE")
                .index(1),
        )
        .arg(
            Arg::new("staves")
                .help("Number of staves")
                .long("staves")
                .value_name("COUNT")
                .default_value("1")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("measures")
                .help("Number of empty measures to start with")
                .long("measures")
                .short('m')
                .value_name("COUNT")
                .default_value("0")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("time-signature")
                .help("Time signature of the initial measures (e.g. 3/4)")
                .long("time-signature")
                .value_name("N/D")
                .default_value("4/4")
                .value_parser(clap::value_parser!(String)),
        )
        .arg(
            Arg::new("tempo")
                .help("Initial tempo in quarter notes per minute")
                .long("tempo")
                .value_name("BPM")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("expand-repeats")
                .help("Traverse and export in playback order")
                .long("expand-repeats")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("list")
                .help("Print the segments visited with the given filter (e.g. chord-rest|breath)")
                .long("list")
                .value_name("FILTER")
                .num_args(0..=1)
                .default_missing_value("chord-rest"),
        )
        .arg(
            Arg::new("midi")
                .help("Write the resulting score as a MIDI file")
                .long("midi")
                .value_name("OUTPUT_FILE"),
        )
        .arg(
            Arg::new("verbose")
                .help("Enable debug logging")
                .short('v')
                .long("verbose")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let verbose = matches.get_flag("verbose");
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if verbose { "debug" } else { "info" }),
    )
    .init();

    let time_signature: TimeSignature = matches
        .get_one::<String>("time-signature")
        .map(String::as_str)
        .unwrap_or("4/4")
        .parse()
        .context("Invalid --time-signature")?;
    let setup = ScoreSetup {
        staves: matches.get_one::<usize>("staves").copied().unwrap_or(1),
        measures: matches.get_one::<usize>("measures").copied().unwrap_or(0),
        time_signature,
        tempo: matches.get_one::<f64>("tempo").copied(),
        expand_repeats: matches.get_flag("expand-repeats"),
    };
    log::debug!("{:?}", setup);

    let mut runner = ScriptRunner::new(&setup)?;
    if let Some(script_file) = matches.get_one::<String>("script") {
        let content = std::fs::read_to_string(script_file)
            .with_context(|| format!("Failed to read command file: {}", script_file))?;
        let script = parse_script(&content)
            .with_context(|| format!("Failed to parse command file: {}", script_file))?;
        runner
            .run(&script)
            .with_context(|| format!("Failed to run command file: {}", script_file))?;
    }
    for line in runner.output() {
        println!("{}", line);
    }

    if let Some(filter) = matches.get_one::<String>("list") {
        let filter: SegmentTypeFilter = filter.parse().context("Invalid --list filter")?;
        let listing =
            score_cursor::Listing::new(runner.score(), filter, runner.cursor().expand_repeats());
        print!("{}", listing);
    }

    if let Some(output_file) = matches.get_one::<String>("midi") {
        #[cfg(feature = "midi")]
        {
            log::info!("Writing MIDI file: {}", output_file);
            let expand_repeats = runner.cursor().expand_repeats();
            let midi_bytes = midi::convert_score_to_midi(runner.score(), expand_repeats)
                .context("Failed to convert score to MIDI")?;
            std::fs::write(output_file, midi_bytes)
                .with_context(|| format!("Failed to write MIDI file: {}", output_file))?;
        }
        #[cfg(not(feature = "midi"))]
        {
            anyhow::bail!(
                "MIDI support is not enabled, cannot write {}. Compile with --features midi",
                output_file
            );
        }
    }

    Ok(())
}
