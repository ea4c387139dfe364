use std::process;

use clap::Parser;
use tracecop_cli::{App, Command, GenerateArgs, VerifyArgs};
use tracecop_core::{AnalysisContext, JsonLinesSource, TraceRecord};
use tracecop_testgen::generator::{generate_single_trace, TraceParams};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let app = App::parse();
    match &app.command {
        Command::Verify(args) => verify(args),
        Command::Generate(args) => generate(args),
        Command::Schema => schema(),
    }
}

fn fail(message: &str) -> ! {
    eprintln!("{message}");
    process::exit(2);
}

fn verify(args: &VerifyArgs) {
    let config = args
        .analysis_config()
        .unwrap_or_else(|e| fail(&format!("Failed to load configuration: {e}")));

    let sources = args
        .files
        .iter()
        .map(|path| {
            JsonLinesSource::open(path)
                .unwrap_or_else(|e| fail(&format!("Failed to open {}: {e}", path.display())))
        })
        .collect();

    let mut ctx = AnalysisContext::new(config, sources)
        .unwrap_or_else(|e| fail(&format!("Failed to start analysis: {e}")));
    if let Some(path) = &args.initial {
        let initial = tracecop_cli::read_initial(path)
            .unwrap_or_else(|e| fail(&format!("Failed to read {}: {e}", path.display())));
        ctx.seed_initial(initial);
    }

    let report = ctx
        .run()
        .unwrap_or_else(|e| fail(&format!("Analysis aborted: {e}")));

    if let Some(dir) = &args.certificates {
        let written = tracecop_cli::write_certificates(dir, &report.findings);
        eprintln!("Wrote {written} certificates to {}", dir.display());
    }
    if let Some(path) = &args.ordering {
        if let Err(e) = tracecop_cli::write_ordering(path, &report.ordering) {
            tracing::error!("cannot write ordering dependencies to {}: {e}", path.display());
        }
    }

    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => fail(&format!("Failed to encode report: {e}")),
        }
    } else {
        for finding in &report.findings {
            println!("{finding}");
        }
        let stats = &report.statistics;
        println!(
            "{} records analyzed, {} ww / {} wr / {} rw dependencies, {} findings",
            stats.analyzed,
            stats.ww,
            stats.wr,
            stats.rw,
            report.findings.len()
        );
    }

    if !report.is_clean() {
        process::exit(1);
    }
}

fn generate(args: &GenerateArgs) {
    let params = TraceParams::builder()
        .n_thread(args.n_thread)
        .n_key(args.n_key)
        .n_txn(args.n_txn)
        .n_op(args.n_op)
        .abort_percent(args.abort_percent)
        .build();
    let (initial, threads) = generate_single_trace(&params);

    tracecop_cli::write_trace(&args.output_dir, &initial, &threads)
        .unwrap_or_else(|e| fail(&format!("Failed to write trace: {e}")));

    println!(
        "Generated {} records over {} threads to {}",
        threads.iter().map(Vec::len).sum::<usize>(),
        threads.len(),
        args.output_dir.display()
    );
}

fn schema() {
    let schema = schemars::schema_for!(TraceRecord);
    match serde_json::to_string_pretty(&schema) {
        Ok(json) => println!("{json}"),
        Err(e) => fail(&format!("Failed to encode schema: {e}")),
    }
}
