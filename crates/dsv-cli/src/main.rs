// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod report;
mod runtime;

use anyhow::{Context, Result, anyhow, bail};
use config::Config;
use dsv_api::Client;
use dsv_app::{AppCommand, SessionState, parse_date};
use dsv_db::Store;
use runtime::{ApiRuntime, CacheRuntime, refresh, resolve_range};
use std::env;
use std::path::PathBuf;
use time::{Date, OffsetDateTime};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

const DEFAULT_DAYS: i64 = 7;

fn main() {
    init_tracing();
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `dsv --print-example-config` to generate a v1 template",
            options.config_path.display()
        )
    })?;

    let db_path = config.db_path()?;
    if options.print_db_path {
        println!("{}", db_path.display());
        return Ok(());
    }

    if options.offline && options.no_store {
        bail!("--offline reads the local store; drop --no-store");
    }

    let today = OffsetDateTime::now_utc().date();
    let range = resolve_range(
        options.start.as_deref(),
        options.end.as_deref(),
        options.days,
        today,
        config.max_span_days(),
    )
    .context("invalid date range; no request was sent")?;

    let store = if options.offline || (config.storage_enabled() && !options.no_store) {
        let mut store = Store::open(&db_path).with_context(|| {
            format!(
                "open database {} -- if this path is wrong, set [storage].db_path or DSV_DB_PATH",
                db_path.display()
            )
        })?;
        store.bootstrap()?;
        store.set_write_policy(config.write_policy());
        Some(store)
    } else {
        None
    };

    let mut state = SessionState::default();
    if options.sku.is_some() {
        state.dispatch(AppCommand::SetSkuFilter(options.sku.clone()));
    }
    if options.day.is_some() {
        state.dispatch(AppCommand::SetDayFilter(options.day));
    }

    if options.offline {
        let store = store
            .as_ref()
            .ok_or_else(|| anyhow!("--offline needs the local store"))?;
        if options.check_only {
            return Ok(());
        }
        refresh(&mut state, &mut CacheRuntime::new(store), range)?;
        print!("{}", report::render_report(&state, None));
        return Ok(());
    }

    let credentials = config.credentials()?;
    let ship_node = config.ship_node()?;
    let client = Client::new(config.client_options()?).with_context(|| {
        format!(
            "invalid [api] config in {}; fix base_url/page_size/max_pages values",
            options.config_path.display()
        )
    })?;
    if options.check_only {
        return Ok(());
    }

    let mut runtime = ApiRuntime::new(&client, &credentials, &ship_node);
    if let Some(store) = store.as_ref() {
        runtime = runtime.with_store(store);
    }
    refresh(&mut state, &mut runtime, range)?;
    print!("{}", report::render_report(&state, runtime.last_write()));

    if let Some(failure) = state.snapshot().and_then(|snapshot| snapshot.failure.as_deref()) {
        bail!("refresh incomplete: {failure}");
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    start: Option<String>,
    end: Option<String>,
    days: i64,
    sku: Option<String>,
    day: Option<Date>,
    offline: bool,
    no_store: bool,
    print_config_path: bool,
    print_db_path: bool,
    print_example: bool,
    check_only: bool,
    show_help: bool,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        start: None,
        end: None,
        days: DEFAULT_DAYS,
        sku: None,
        day: None,
        offline: false,
        no_store: false,
        print_config_path: false,
        print_db_path: false,
        print_example: false,
        check_only: false,
        show_help: false,
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
            }
            "--start" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--start requires a YYYY-MM-DD date"))?;
                options.start = Some(value.as_ref().to_owned());
            }
            "--end" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--end requires a YYYY-MM-DD date"))?;
                options.end = Some(value.as_ref().to_owned());
            }
            "--days" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--days requires a number of days"))?;
                let raw = value.as_ref();
                let days: i64 = raw
                    .parse()
                    .with_context(|| format!("--days expects a whole number, got {raw:?}"))?;
                if days < 0 {
                    bail!("--days must not be negative, got {days}");
                }
                options.days = days;
            }
            "--sku" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--sku requires text to match"))?;
                options.sku = Some(value.as_ref().to_owned());
            }
            "--day" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--day requires a YYYY-MM-DD date"))?;
                options.day = Some(parse_date(value.as_ref()).context("--day")?);
            }
            "--offline" => {
                options.offline = true;
            }
            "--no-store" => {
                options.no_store = true;
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-path" => {
                options.print_db_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            unknown => {
                return Err(anyhow!(
                    "unknown argument {unknown:?}; run with --help to see supported options"
                ));
            }
        }
    }

    Ok(options)
}

fn print_help() {
    println!("dsv: marketplace order report");
    println!("  --config <path>          Use a specific config path");
    println!("  --start <YYYY-MM-DD>     First created date to fetch");
    println!("  --end <YYYY-MM-DD>       Last created date to fetch (default today)");
    println!("  --days <N>               Days before the end date when --start is unset");
    println!("  --sku <text>             Only show rows whose SKU contains <text>");
    println!("  --day <YYYY-MM-DD>       Only show rows from one day");
    println!("  --offline                Report from the local store without calling the API");
    println!("  --no-store               Do not write fetched rows to the local store");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-path             Print resolved database path");
    println!("  --print-example-config   Print a v1 config template");
    println!("  --check                  Validate config, credentials and database, then exit");
    println!("  --help                   Show this help");
}

#[cfg(test)]
mod tests {
    use super::{CliOptions, DEFAULT_DAYS, parse_cli_args};
    use anyhow::Result;
    use std::path::PathBuf;
    use time::macros::date;

    fn default_options_path() -> PathBuf {
        PathBuf::from("/tmp/dsv-config.toml")
    }

    #[test]
    fn parse_cli_args_defaults_to_provided_config_path() -> Result<()> {
        let options = parse_cli_args(Vec::<String>::new(), default_options_path())?;
        assert_eq!(
            options,
            CliOptions {
                config_path: default_options_path(),
                start: None,
                end: None,
                days: DEFAULT_DAYS,
                sku: None,
                day: None,
                offline: false,
                no_store: false,
                print_config_path: false,
                print_db_path: false,
                print_example: false,
                check_only: false,
                show_help: false,
            }
        );
        Ok(())
    }

    #[test]
    fn parse_cli_args_sets_config_path_override() -> Result<()> {
        let options = parse_cli_args(
            vec!["--config", "/custom/config.toml"],
            default_options_path(),
        )?;
        assert_eq!(options.config_path, PathBuf::from("/custom/config.toml"));
        Ok(())
    }

    #[test]
    fn parse_cli_args_reads_range_and_filters() -> Result<()> {
        let options = parse_cli_args(
            vec![
                "--start",
                "2026-03-01",
                "--end",
                "2026-03-08",
                "--days",
                "14",
                "--sku",
                "LAMP",
                "--day",
                "2026-03-02",
            ],
            default_options_path(),
        )?;
        assert_eq!(options.start.as_deref(), Some("2026-03-01"));
        assert_eq!(options.end.as_deref(), Some("2026-03-08"));
        assert_eq!(options.days, 14);
        assert_eq!(options.sku.as_deref(), Some("LAMP"));
        assert_eq!(options.day, Some(date!(2026 - 03 - 02)));
        Ok(())
    }

    #[test]
    fn parse_cli_args_errors_for_missing_values() {
        for flag in ["--config", "--start", "--end", "--days", "--sku", "--day"] {
            let error = parse_cli_args(vec![flag], default_options_path())
                .expect_err("missing value should fail");
            assert!(error.to_string().contains("requires"), "{flag}: {error}");
        }
    }

    #[test]
    fn parse_cli_args_rejects_bad_numbers_and_dates() {
        let error = parse_cli_args(vec!["--days", "week"], default_options_path())
            .expect_err("non-numeric days should fail");
        assert!(error.to_string().contains("whole number"));

        let error = parse_cli_args(vec!["--days", "-3"], default_options_path())
            .expect_err("negative days should fail");
        assert!(error.to_string().contains("must not be negative"));

        let error = parse_cli_args(vec!["--day", "03/02/2026"], default_options_path())
            .expect_err("bad day should fail");
        assert!(format!("{error:#}").contains("invalid date"));
    }

    #[test]
    fn parse_cli_args_errors_for_unknown_argument() {
        let error = parse_cli_args(vec!["--wat"], default_options_path())
            .expect_err("unknown arg should fail");
        let message = error.to_string();
        assert!(message.contains("unknown argument"));
        assert!(message.contains("--help"));
    }

    #[test]
    fn parse_cli_args_sets_mode_and_print_flags() -> Result<()> {
        let options = parse_cli_args(
            vec![
                "--offline",
                "--no-store",
                "--print-config-path",
                "--print-path",
                "--print-example-config",
                "--check",
            ],
            default_options_path(),
        )?;
        assert!(options.offline);
        assert!(options.no_store);
        assert!(options.print_config_path);
        assert!(options.print_db_path);
        assert!(options.print_example);
        assert!(options.check_only);
        assert!(!options.show_help);
        Ok(())
    }

    #[test]
    fn parse_cli_args_sets_help_flag_for_long_and_short_variants() -> Result<()> {
        let long = parse_cli_args(vec!["--help"], default_options_path())?;
        assert!(long.show_help);

        let short = parse_cli_args(vec!["-h"], default_options_path())?;
        assert!(short.show_help);
        Ok(())
    }
}
