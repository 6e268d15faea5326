// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command line interface for PDF timestamping.

use {
    clap::{Arg, ArgMatches, Command},
    log::LevelFilter,
    pdf_timestamp::{
        archive_pdf, extract_timestamps, timestamp_pdf, verify_timestamp, ArchiveOptions,
        PdfTimestampError, SignatureState, TimestampOptions, VerifyOptions,
    },
    std::{
        path::{Path, PathBuf},
        str::FromStr,
        time::Duration,
    },
    timestamp_protocol::{Certificate, DigestAlgorithm},
};

fn cli() -> Command<'static> {
    let algorithm = Arg::new("algorithm")
        .short('a')
        .long("algorithm")
        .takes_value(true)
        .default_value("SHA-256")
        .help("Imprint hash algorithm: SHA-256, SHA-384, or SHA-512");

    let timeout = Arg::new("timeout")
        .long("timeout")
        .takes_value(true)
        .default_value("30000")
        .help("TSA request deadline in milliseconds");

    let retry = Arg::new("retry")
        .long("retry")
        .takes_value(true)
        .default_value("3")
        .help("Attempts for recoverable TSA failures");

    Command::new("pdf-timestamp")
        .about("Add, extract, and verify RFC 3161 timestamps in PDF documents")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .help("Enable debug logging"),
        )
        .subcommand(
            Command::new("timestamp")
                .about("Apply a trusted timestamp to a document")
                .arg(Arg::new("tsa_url").required(true).help("TSA endpoint URL"))
                .arg(Arg::new("file").required(true).help("Input PDF"))
                .arg(Arg::new("output").help("Output path (default: <stem>-timestamped<ext>)"))
                .arg(algorithm.clone())
                .arg(
                    Arg::new("ltv")
                        .long("ltv")
                        .help("Embed long-term validation data (DSS/VRI)"),
                )
                .arg(
                    Arg::new("reason")
                        .long("reason")
                        .takes_value(true)
                        .help("Signature reason text"),
                )
                .arg(
                    Arg::new("location")
                        .long("location")
                        .takes_value(true)
                        .help("Signature location text"),
                )
                .arg(
                    Arg::new("contact-info")
                        .long("contact-info")
                        .takes_value(true)
                        .help("Signature contact info text"),
                )
                .arg(
                    Arg::new("name")
                        .long("name")
                        .takes_value(true)
                        .default_value("Timestamp")
                        .help("Signature field name"),
                )
                .arg(
                    Arg::new("policy")
                        .long("policy")
                        .takes_value(true)
                        .help("TSA policy OID to request, in dotted form"),
                )
                .arg(
                    Arg::new("size")
                        .long("size")
                        .takes_value(true)
                        .default_value("0")
                        .help("Reserved token bytes; 0 selects automatic sizing"),
                )
                .arg(timeout.clone())
                .arg(retry.clone())
                .arg(
                    Arg::new("optimize")
                        .long("optimize")
                        .help("Spend one extra TSA round to shrink the placeholder"),
                )
                .arg(
                    Arg::new("omit-m")
                        .long("omit-m")
                        .help("Leave out the /M (modification time) entry"),
                ),
        )
        .subcommand(
            Command::new("verify")
                .about("Verify every timestamp in a document")
                .arg(Arg::new("file").required(true).help("Input PDF"))
                .arg(
                    Arg::new("rfc8933")
                        .long("rfc8933")
                        .help("Require an ESS signing-certificate attribute"),
                )
                .arg(
                    Arg::new("trust")
                        .long("trust")
                        .takes_value(true)
                        .multiple_occurrences(true)
                        .help("PEM or DER trust anchor for chain validation (repeatable)"),
                ),
        )
        .subcommand(
            Command::new("archive")
                .about("Re-timestamp a document for long-term archival")
                .arg(Arg::new("tsa_url").required(true).help("TSA endpoint URL"))
                .arg(Arg::new("file").required(true).help("Input PDF"))
                .arg(Arg::new("output").help("Output path (default: <stem>-timestamped<ext>)"))
                .arg(algorithm)
                .arg(
                    Arg::new("no-update")
                        .long("no-update")
                        .help("Embed only the revocation data the tokens already carry"),
                )
                .arg(timeout)
                .arg(retry),
        )
}

fn main() {
    let exit_code = match main_impl() {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error [{}]: {}", e.code(), e);
            1
        }
    };

    std::process::exit(exit_code);
}

fn main_impl() -> Result<(), PdfTimestampError> {
    let matches = cli().get_matches();

    let level = if matches.is_present("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::from_env(env_logger::Env::default())
        .filter_level(level)
        .init();

    match matches.subcommand() {
        Some(("timestamp", args)) => command_timestamp(args),
        Some(("verify", args)) => command_verify(args),
        Some(("archive", args)) => command_archive(args),
        _ => unreachable!("subcommand required"),
    }
}

fn timestamp_options_from(args: &ArgMatches) -> Result<TimestampOptions, PdfTimestampError> {
    let mut options = TimestampOptions {
        tsa_url: args.value_of("tsa_url").unwrap_or_default().to_string(),
        ..TimestampOptions::default()
    };

    if let Some(algorithm) = args.value_of("algorithm") {
        options.tsa.hash_algorithm = DigestAlgorithm::from_str(algorithm)
            .map_err(|_| PdfTimestampError::UnsupportedAlgorithm(algorithm.to_string()))?;
    }

    if let Some(timeout) = args.value_of("timeout") {
        let millis: u64 = timeout
            .parse()
            .map_err(|_| PdfTimestampError::Pdf(format!("invalid --timeout value: {}", timeout)))?;
        options.tsa.timeout = Duration::from_millis(millis);
    }

    if let Some(retry) = args.value_of("retry") {
        options.tsa.retry = retry
            .parse()
            .map_err(|_| PdfTimestampError::Pdf(format!("invalid --retry value: {}", retry)))?;
    }

    Ok(options)
}

fn command_timestamp(args: &ArgMatches) -> Result<(), PdfTimestampError> {
    let input = PathBuf::from(args.value_of("file").expect("required"));
    let output = resolve_output_path(&input, args.value_of("output"));

    let mut options = timestamp_options_from(args)?;

    options.enable_ltv = args.is_present("ltv");
    options.optimize_placeholder = args.is_present("optimize");
    options.omit_modification_time = args.is_present("omit-m");
    options.reason = args.value_of("reason").map(String::from);
    options.location = args.value_of("location").map(String::from);
    options.contact_info = args.value_of("contact-info").map(String::from);

    if let Some(name) = args.value_of("name") {
        options.field_name = name.to_string();
    }

    if let Some(size) = args.value_of("size") {
        options.signature_size = size
            .parse()
            .map_err(|_| PdfTimestampError::Pdf(format!("invalid --size value: {}", size)))?;
    }

    if let Some(policy) = args.value_of("policy") {
        let encoded = encode_dotted_oid(policy).ok_or_else(|| {
            PdfTimestampError::Pdf(format!("invalid --policy OID: {}", policy))
        })?;
        options.tsa.policy = Some(bcder::Oid(encoded.into()));
    }

    let pdf = std::fs::read(&input)?;

    let outcome = timestamp_pdf(&pdf, &options)?;

    std::fs::write(&output, &outcome.pdf)?;

    println!(
        "Timestamped {} -> {}",
        input.display(),
        output.display()
    );
    println!(
        "  time:       {}",
        outcome.info.gen_time.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("  serial:     {}", outcome.info.serial_number_hex);
    println!("  policy:     {}", outcome.info.policy);
    println!(
        "  token:      {} bytes in a {} byte placeholder",
        outcome.token_size, outcome.signature_size
    );

    Ok(())
}

fn command_verify(args: &ArgMatches) -> Result<(), PdfTimestampError> {
    let input = PathBuf::from(args.value_of("file").expect("required"));
    let pdf = std::fs::read(&input)?;

    let mut trust_store = Vec::new();
    if let Some(paths) = args.values_of("trust") {
        for path in paths {
            trust_store.extend(load_trust_anchors(Path::new(path))?);
        }
    }

    let options = VerifyOptions {
        trust_store,
        strict_ess: args.is_present("rfc8933"),
        check_document_hash: true,
    };

    let records = extract_timestamps(&pdf)?;

    if records.is_empty() {
        return Err(PdfTimestampError::VerificationFailed(
            "document carries no timestamp signatures".to_string(),
        ));
    }

    let mut failures = 0usize;

    for (index, record) in records.into_iter().enumerate() {
        let record = verify_timestamp(&pdf, record, &options);

        let name = record
            .field_name
            .clone()
            .unwrap_or_else(|| format!("signature {}", index + 1));

        println!("{}:", name);
        println!(
            "  time:       {}",
            record.info.gen_time.format("%Y-%m-%d %H:%M:%S UTC")
        );
        println!("  serial:     {}", record.info.serial_number_hex);
        println!("  policy:     {}", record.info.policy);
        println!("  algorithm:  {}", record.info.hash_algorithm);
        println!(
            "  coverage:   {}",
            if record.covers_whole_document {
                "whole document"
            } else {
                "earlier revision"
            }
        );

        match record.state {
            SignatureState::VerifiedOk => println!("  status:     OK"),
            _ => {
                failures += 1;
                println!(
                    "  status:     FAILED ({})",
                    record
                        .verification_error
                        .unwrap_or_else(|| "unknown error".to_string())
                );
            }
        }
    }

    if failures > 0 {
        Err(PdfTimestampError::VerificationFailed(format!(
            "{} timestamp(s) failed verification",
            failures
        )))
    } else {
        Ok(())
    }
}

fn command_archive(args: &ArgMatches) -> Result<(), PdfTimestampError> {
    let input = PathBuf::from(args.value_of("file").expect("required"));
    let output = resolve_output_path(&input, args.value_of("output"));

    let options = ArchiveOptions {
        timestamp: timestamp_options_from(args)?,
        refresh_revocation: !args.is_present("no-update"),
    };

    let pdf = std::fs::read(&input)?;

    let outcome = archive_pdf(&pdf, &options)?;

    std::fs::write(&output, &outcome.pdf)?;

    println!(
        "Archived {} -> {} ({} existing timestamp(s) verified)",
        input.display(),
        output.display(),
        outcome.existing_verified
    );
    println!(
        "  covering time:   {}",
        outcome.covering.info.gen_time.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("  covering serial: {}", outcome.covering.info.serial_number_hex);

    Ok(())
}

/// `<stem>-timestamped<ext>` next to the input, unless given.
fn resolve_output_path(input: &Path, explicit: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }

    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());

    let name = match input.extension() {
        Some(ext) => format!("{}-timestamped.{}", stem, ext.to_string_lossy()),
        None => format!("{}-timestamped", stem),
    };

    input.with_file_name(name)
}

fn load_trust_anchors(path: &Path) -> Result<Vec<Certificate>, PdfTimestampError> {
    let data = std::fs::read(path)?;

    let anchors = if data.starts_with(b"-----") {
        Certificate::from_pem_multiple(&data).map_err(PdfTimestampError::Protocol)?
    } else {
        vec![Certificate::from_der(data).map_err(PdfTimestampError::Protocol)?]
    };

    Ok(anchors)
}

/// Encode a dotted-decimal OID into its DER content bytes.
fn encode_dotted_oid(dotted: &str) -> Option<Vec<u8>> {
    let arcs: Vec<u128> = dotted
        .split('.')
        .map(|arc| arc.parse().ok())
        .collect::<Option<_>>()?;

    if arcs.len() < 2 || arcs[0] > 2 || (arcs[0] < 2 && arcs[1] > 39) {
        return None;
    }

    let mut out = Vec::new();
    let mut values = vec![arcs[0] * 40 + arcs[1]];
    values.extend_from_slice(&arcs[2..]);

    for value in values {
        let mut chunk = [0u8; 19];
        let mut index = chunk.len();
        let mut remaining = value;

        loop {
            index -= 1;
            chunk[index] = (remaining & 0x7f) as u8;
            remaining >>= 7;
            if remaining == 0 {
                break;
            }
        }

        for (i, byte) in chunk[index..].iter().enumerate() {
            let last = i == chunk.len() - index - 1;
            out.push(if last { *byte } else { byte | 0x80 });
        }
    }

    Some(out)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn output_path_derivation() {
        assert_eq!(
            resolve_output_path(Path::new("doc.pdf"), None),
            PathBuf::from("doc-timestamped.pdf")
        );
        assert_eq!(
            resolve_output_path(Path::new("dir/report.pdf"), None),
            PathBuf::from("dir/report-timestamped.pdf")
        );
        assert_eq!(
            resolve_output_path(Path::new("bare"), None),
            PathBuf::from("bare-timestamped")
        );
        assert_eq!(
            resolve_output_path(Path::new("doc.pdf"), Some("out.pdf")),
            PathBuf::from("out.pdf")
        );
    }

    #[test]
    fn dotted_oid_encoding() {
        // 1.3.6.1.5.5.7.48.1
        assert_eq!(
            encode_dotted_oid("1.3.6.1.5.5.7.48.1").unwrap(),
            vec![43, 6, 1, 5, 5, 7, 48, 1]
        );

        // 2.16.840.1.101.3.4.2.1 (SHA-256) exercises multi-byte arcs.
        assert_eq!(
            encode_dotted_oid("2.16.840.1.101.3.4.2.1").unwrap(),
            vec![96, 134, 72, 1, 101, 3, 4, 2, 1]
        );

        assert!(encode_dotted_oid("").is_none());
        assert!(encode_dotted_oid("1").is_none());
        assert!(encode_dotted_oid("1.40").is_none());
        assert!(encode_dotted_oid("not.an.oid").is_none());
    }

    #[test]
    fn cli_definition_is_consistent() {
        cli().debug_assert();
    }
}
