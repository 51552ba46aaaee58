use anyhow::{Context, Result};
use colored::Colorize;
use env_logger::{Builder, Target};
use log::LevelFilter;
use regex::Regex;
use scemtools::cli::Commands;
use scemtools::error::StageError;
use scemtools::runner::SystemExecutor;
use scemtools::*;
use std::time::Instant;

fn main() {
    if let Err(e) = parse_cli() {
        eprintln!("{} {:#}", "error:".bold().red(), e);
        let code = e
            .downcast_ref::<StageError>()
            .map(|s| s.exit_code())
            .unwrap_or(1);
        std::process::exit(code);
    }
}

fn barcode_regex(pattern: &str) -> Result<Regex> {
    let re = Regex::new(pattern).with_context(|| format!("invalid barcode regex {}", pattern))?;
    Ok(re)
}

pub fn parse_cli() -> Result<()> {
    let pg_start = Instant::now();
    let args = cli::make_cli_parse();
    let matches = cli::make_cli_app().get_matches();
    let subcommand = matches.subcommand_name().unwrap_or("scem").to_string();

    // set the logging level
    let min_log_level = match args.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    Builder::new()
        .target(Target::Stderr)
        .filter(None, min_log_level)
        .init();

    log::debug!("DEBUG logging enabled");
    log::trace!("TRACE logging enabled");

    // set up number of threads to use globally
    rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build_global()
        .context("failed to build the global thread pool")?;

    let tools = args.tools();
    let mut exec = SystemExecutor::new(args.dry_run);

    match &args.command {
        //
        // Run AddCbUmi
        //
        Some(Commands::AddCbUmi {
            in1,
            in2,
            out1,
            out2,
            cb,
            prefix,
            cb_len,
            umi_len,
        }) => {
            let opts = barcode::TagOptions {
                in1: in1.clone(),
                in2: in2.clone(),
                out1: out1.clone(),
                out2: out2.clone(),
                whitelist: cb.clone(),
                prefix: prefix.clone(),
                cb_len: *cb_len,
                umi_len: *umi_len,
            };
            barcode::run_add_cb_umi(&opts)?;
        }
        //
        // Run Trim
        //
        Some(Commands::Trim {
            r1,
            r2,
            sample,
            out_dir,
            cut_r1,
            cut_r2,
            quality,
            min_len,
        }) => {
            let opts = trim::TrimOptions {
                r1: r1.clone(),
                r2: r2.clone(),
                sample: sample.clone(),
                out_dir: out_dir.clone(),
                cut_r1: *cut_r1,
                cut_r2: *cut_r2,
                quality: *quality,
                min_len: *min_len,
                threads: args.threads,
            };
            trim::run_trim(&opts, &tools, &mut exec)?;
        }
        //
        // Run Align
        //
        Some(Commands::Align {
            genome,
            reads_dir,
            reads_suffix,
            bismark_dir,
            merge_dir,
            out_dir,
            prefix,
            directional,
            skip_align,
        }) => {
            let opts = align::AlignOptions {
                genome: genome.clone(),
                reads_dir: reads_dir.clone(),
                reads_suffix: reads_suffix.clone(),
                bismark_dir: bismark_dir.clone(),
                merge_dirs: merge_dir.clone(),
                out_dir: out_dir.clone(),
                prefix: prefix.clone(),
                non_directional: !*directional,
                skip_align: *skip_align,
                threads: args.threads,
            };
            let out = align::run_align(&opts, &tools, &mut exec)?;
            log::info!(
                "Name-sorted BAM for splitting: {}",
                out.name_sorted.display()
            );
        }
        //
        // Run Split
        //
        Some(Commands::Split {
            bam,
            out_dir,
            cb_field,
            min_fields,
            max_open,
        }) => {
            let opts = split::SplitOptions {
                bam: bam.clone(),
                out_dir: out_dir.clone(),
                cb_field: *cb_field,
                min_fields: *min_fields,
                max_open: *max_open,
                threads: args.threads,
            };
            split::split_bam_by_cb(&opts)?;
        }
        //
        // Run Dedup
        //
        Some(Commands::Dedup {
            sam_dir,
            out_dir,
            extract_dir,
            commands,
            genome,
            paired,
            no_gzip,
            bedgraph,
            comprehensive,
            commands_only,
        }) => {
            let opts = dedup::DedupOptions {
                sam_dir: sam_dir.clone(),
                out_dir: out_dir.clone(),
                extract_dir: extract_dir.clone(),
                commands_file: commands.clone(),
                genome: genome.clone(),
                paired: *paired,
                gzip: !*no_gzip,
                bedgraph: *bedgraph,
                comprehensive: *comprehensive,
                commands_only: *commands_only,
                threads: args.threads,
            };
            dedup::run_dedup(&opts, &tools, &mut exec)?;
        }
        //
        // Run CountUmi
        //
        Some(Commands::CountUmi {
            bam_dir,
            summary,
            detail_dir,
            barcode_regex: pattern,
        }) => {
            let opts = umi::UmiOptions {
                bam_dir: bam_dir.clone(),
                summary: summary.clone(),
                detail_dir: detail_dir.clone(),
                barcode_re: barcode_regex(pattern)?,
            };
            umi::run_count_umi(&opts)?;
        }
        //
        // Run Mcpg
        //
        Some(Commands::Mcpg {
            input_dir,
            summary,
            barcode_regex: pattern,
        }) => {
            let opts = mcpg::McpgOptions {
                input_dir: input_dir.clone(),
                summary: summary.clone(),
                barcode_re: barcode_regex(pattern)?,
            };
            mcpg::run_mcpg(&opts)?;
        }
        //
        // no command opt
        //
        None => {}
    };

    let duration = pg_start.elapsed();
    log::info!(
        "{} done! Time elapsed: {}",
        subcommand.bright_green().bold(),
        format!("{:.2?}", duration).bright_yellow().bold()
    );
    Ok(())
}
