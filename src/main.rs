use clap::{value_parser, Arg, ArgMatches, Command};
use reweather::{
    assembler::Engine,
    config::AssembleConfig,
    data_io::hub_height::add_hub_height_column,
    inspect,
    math::wind::ProfileLaw,
    retrieval::{Period, RetrievalRequest},
};
use std::path::Path;

fn main() {
    env_logger::init();
    let matches = build_cli().get_matches();

    match matches.subcommand() {
        Some(("assemble", sub_matches)) => {
            std::process::exit(run_assemble(sub_matches));
        }
        Some(("hub-height", sub_matches)) => {
            if let Err(e) = run_hub_height(sub_matches) {
                eprintln!("Hub-height error: {}", e);
                std::process::exit(1);
            }
        }
        Some(("inspect", sub_matches)) => {
            if let Err(e) = run_inspect(sub_matches) {
                eprintln!("Inspect error: {}", e);
                std::process::exit(1);
            }
        }
        Some(("request", sub_matches)) => {
            if let Err(e) = run_request(sub_matches) {
                eprintln!("Request error: {}", e);
                std::process::exit(1);
            }
        }
        _ => {
            eprintln!("Please specify a subcommand. Use --help for more information.");
            std::process::exit(1);
        }
    }
}

fn run_assemble(matches: &ArgMatches) -> i32 {
    let tokens: Vec<&String> = matches
        .get_many::<String>("tokens")
        .map(|v| v.collect())
        .unwrap_or_default();
    let cfg = match AssembleConfig::from_tokens(tokens) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return 3;
        }
    };

    match Engine::new().run(&cfg) {
        Ok(report) => {
            for path in &report.written {
                println!("{}", path.display());
            }
            for (lat, lon) in &report.suppressed {
                eprintln!("suppressed: {},{}", lat, lon);
            }
            report.code
        }
        Err(e) => {
            eprintln!("Assembly error: {}", e);
            e.return_code()
        }
    }
}

fn run_hub_height(matches: &ArgMatches) -> Result<(), String> {
    let file = matches
        .get_one::<String>("file")
        .ok_or("missing file argument")?;
    let height = *matches
        .get_one::<f64>("height")
        .ok_or("missing height argument")?;
    let law: ProfileLaw = matches
        .get_one::<String>("law")
        .map(|s| s.parse())
        .transpose()?
        .unwrap_or(ProfileLaw::Logarithmic);

    add_hub_height_column(Path::new(file), height, law).map_err(|e| e.to_string())
}

fn run_inspect(matches: &ArgMatches) -> Result<(), String> {
    let dir = matches
        .get_one::<String>("dir")
        .ok_or("missing directory argument")?;
    let report = inspect::inspect(Path::new(dir)).map_err(|e| e.to_string())?;
    let json = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}

fn run_request(matches: &ArgMatches) -> Result<(), String> {
    let period = matches
        .get_one::<String>("period")
        .ok_or("missing period argument")?;
    let period = Period::parse(period).map_err(|e| e.to_string())?;

    let request = if let Some(dir) = matches.get_one::<String>("fill-from") {
        let report = inspect::inspect(Path::new(dir)).map_err(|e| e.to_string())?;
        RetrievalRequest::for_gap_year(&report, period.year()).map_err(|e| e.to_string())?
    } else {
        let area = parse_four(matches.get_one::<String>("area"), [90.0, -180.0, -90.0, 180.0])?;
        let grid = matches
            .get_one::<String>("grid")
            .map(|s| parse_pair(s))
            .transpose()?
            .unwrap_or([0.25, 0.25]);
        RetrievalRequest::new(period, area, grid).map_err(|e| e.to_string())?
    };
    let json = serde_json::to_string_pretty(&request).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}

fn parse_four(value: Option<&String>, default: [f64; 4]) -> Result<[f64; 4], String> {
    let value = match value {
        Some(v) => v,
        None => return Ok(default),
    };
    let parts: Vec<f64> = value
        .split(',')
        .map(|s| s.trim().parse().map_err(|_| format!("bad number in {}", value)))
        .collect::<Result<_, _>>()?;
    parts
        .try_into()
        .map_err(|_| format!("expected four comma-separated values, got {}", value))
}

fn parse_pair(value: &str) -> Result<[f64; 2], String> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|s| s.trim().parse().map_err(|_| format!("bad number in {}", value)))
        .collect::<Result<_, _>>()?;
    parts
        .try_into()
        .map_err(|_| format!("expected two comma-separated values, got {}", value))
}

fn build_cli() -> Command {
    Command::new("reweather")
        .version("1.0.0")
        .about("Reanalysis weather-file preparation for solar and wind simulation")
        .subcommand_required(true)
        .subcommand(
            Command::new("assemble")
                .about("Assemble one local-time year of hourly weather files")
                .arg(
                    Arg::new("tokens")
                        .value_name("KEY=VALUE")
                        .help("Run settings, e.g. year=2020 zone=8 latlon=-32.0,115.75 fmat=smw")
                        .num_args(1..)
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("hub-height")
                .about("Extrapolate an SRW wind file to a hub height")
                .arg(
                    Arg::new("file")
                        .long("file")
                        .value_name("FILE")
                        .help("Existing SRW wind weather file")
                        .required(true),
                )
                .arg(
                    Arg::new("height")
                        .long("height")
                        .value_name("METRES")
                        .help("Target hub height above ground")
                        .required(true)
                        .value_parser(value_parser!(f64)),
                )
                .arg(
                    Arg::new("law")
                        .long("law")
                        .value_name("LAW")
                        .help("Profile law: logarithmic or power")
                        .default_value("logarithmic"),
                ),
        )
        .subcommand(
            Command::new("inspect")
                .about("Report period coverage and spatial extent of an input tree")
                .arg(
                    Arg::new("dir")
                        .long("dir")
                        .value_name("DIR")
                        .help("Input tree to scan")
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("request")
                .about("Print the archive retrieval payload for a period")
                .arg(
                    Arg::new("period")
                        .long("period")
                        .value_name("YYYY[MM[DD]]")
                        .help("Target period")
                        .required(true),
                )
                .arg(
                    Arg::new("area")
                        .long("area")
                        .value_name("N,W,S,E")
                        .help("Bounding box in degrees"),
                )
                .arg(
                    Arg::new("grid")
                        .long("grid")
                        .value_name("DLAT,DLON")
                        .help("Grid step in degrees"),
                )
                .arg(
                    Arg::new("fill-from")
                        .long("fill-from")
                        .value_name("DIR")
                        .help("Take area and grid step from an existing input tree")
                        .conflicts_with_all(["area", "grid"]),
                ),
        )
}
