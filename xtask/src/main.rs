use std::env;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use smpv_core::{write_sample, SampleSpec, SmpStore, ViewerConfig};
use smpv_schema::ScenarioId;

fn main() -> Result<(), Box<dyn Error>> {
    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("sample-db") => sample_db(args.collect()),
        Some("render-sample") => render_sample(args.collect()),
        Some("check-config") => check_config(args.next()),
        Some("help") | None => {
            print_usage();
            Ok(())
        }
        Some(cmd) => {
            eprintln!("Unknown xtask '{cmd}'.");
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    eprintln!("Usage: cargo xtask sample-db <path> [--actors N] [--turns N] [--seed N] [--scenario ID]");
    eprintln!("       cargo xtask render-sample <dir>");
    eprintln!("       cargo xtask check-config [path]");
    eprintln!("       cargo xtask help");
}

fn parse_sample_args(args: &[String]) -> Result<(PathBuf, SampleSpec), Box<dyn Error>> {
    let mut spec = SampleSpec::default();
    let mut path = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = || {
            iter.next()
                .ok_or_else(|| format!("missing value for {arg}"))
        };
        match arg.as_str() {
            "--actors" => spec.actors = value()?.parse()?,
            "--turns" => spec.turns = value()?.parse()?,
            "--dimensions" => spec.dimensions = value()?.parse()?,
            "--seed" => spec.seed = value()?.parse()?,
            "--scenario" => spec.scenario = ScenarioId::new(value()?.as_str()),
            other if other.starts_with("--") => {
                return Err(format!("unknown flag {other}").into());
            }
            other => path = Some(PathBuf::from(other)),
        }
    }
    let path = path.ok_or("sample-db needs an output path")?;
    Ok((path, spec))
}

fn write_sample_db(path: &Path, spec: &SampleSpec) -> Result<(), Box<dyn Error>> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let store = SmpStore::create(path)?;
    let stats = write_sample(&store, spec)?;
    println!(
        "Wrote {} ({} actors, {} turns, {} bargains)",
        path.display(),
        stats.actors,
        stats.turns,
        stats.bargains
    );
    Ok(())
}

fn sample_db(args: Vec<String>) -> Result<(), Box<dyn Error>> {
    let (path, spec) = parse_sample_args(&args)?;
    write_sample_db(&path, &spec)
}

fn render_sample(args: Vec<String>) -> Result<(), Box<dyn Error>> {
    let dir = args
        .first()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("target/sample"));
    let spec = SampleSpec::default();
    let db = dir.join("sample.db");
    write_sample_db(&db, &spec)?;

    for turn in 0..spec.turns {
        let status = Command::new("cargo")
            .args(["run", "--quiet", "-p", "smpv_inspector", "--", "render"])
            .arg("--db")
            .arg(&db)
            .args(["--turn", &turn.to_string()])
            .arg("--out")
            .arg(&dir)
            .status()?;
        if !status.success() {
            return Err(format!("render failed for turn {turn}").into());
        }
    }
    Ok(())
}

fn check_config(path: Option<String>) -> Result<(), Box<dyn Error>> {
    let path = path.map(PathBuf::from).unwrap_or_else(|| {
        Path::new("smpv_core")
            .join("src")
            .join("data")
            .join("viewer_config.json")
    });
    let config = ViewerConfig::from_file(&path)?;
    let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path)?)?;
    let unknown: Vec<&String> = value
        .as_object()
        .map(|object| {
            object
                .keys()
                .filter(|key| !matches!(key.as_str(), "chart" | "graph"))
                .collect()
        })
        .unwrap_or_default();
    if !unknown.is_empty() {
        return Err(format!("unknown top-level keys in {}: {unknown:?}", path.display()).into());
    }
    if config.graph.alpha_ticks == 0 || config.chart.y_ticks == 0 {
        return Err("alpha_ticks and y_ticks must be positive".into());
    }
    println!("{} is valid", path.display());
    Ok(())
}
