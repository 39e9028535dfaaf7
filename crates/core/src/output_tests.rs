// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;
use std::io::Write;

/// Minimal tar bytes: one header block with the ustar magic plus an empty
/// data region.
fn tar_bytes() -> Vec<u8> {
    let mut header = vec![0u8; 512];
    header[..12].copy_from_slice(b"results.json");
    header[257..263].copy_from_slice(b"ustar\0");
    header.extend_from_slice(&[0u8; 1024]);
    header
}

fn tar_gz_bytes() -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&tar_bytes()).unwrap();
    encoder.finish().unwrap()
}

#[test]
fn auto_empty() {
    assert_eq!(detect_extension(b"", &[OutputTag::Auto]), (String::new(), vec![]));
}

#[test]
fn auto_json() {
    let (ext, errors) = detect_extension(br#"{"foo": "bar"}"#, &[OutputTag::Auto]);
    assert_eq!(ext, ".json");
    assert!(errors.is_empty());
}

#[test]
fn auto_yaml() {
    let (ext, _) = detect_extension(b"foo: bar", &[OutputTag::Auto]);
    assert_eq!(ext, ".yaml");
}

#[test]
fn auto_toml() {
    let (ext, _) = detect_extension(br#"foo = "bar""#, &[OutputTag::Auto]);
    assert_eq!(ext, ".toml");
}

#[test]
fn auto_tar() {
    let (ext, _) = detect_extension(&tar_bytes(), &[OutputTag::Auto]);
    assert_eq!(ext, ".tar");
}

#[test]
fn auto_tar_gz() {
    let (ext, _) = detect_extension(&tar_gz_bytes(), &[OutputTag::Auto]);
    assert_eq!(ext, ".tar.gz");
}

#[test]
fn auto_rejects_scalar_text() {
    // every probe rejects a line that only yaml would read, as a bare string
    assert_eq!(detect_extension(b"foo,bar", &[OutputTag::Auto]), (String::new(), vec![]));
}

#[test]
fn no_formats_no_extension() {
    assert_eq!(detect_extension(br#"{"foo": "bar"}"#, &[]), (String::new(), vec![]));
}

#[test]
fn explicit_json() {
    let (ext, errors) = detect_extension(br#"{"foo": "bar"}"#, &[OutputTag::Json]);
    assert_eq!(ext, ".json");
    assert!(errors.is_empty());
}

#[test]
fn explicit_list_takes_first_match() {
    let (ext, _) = detect_extension(br#"{"foo": "bar"}"#, &[OutputTag::Toml, OutputTag::Json]);
    assert_eq!(ext, ".json");
}

#[test]
fn explicit_binary_mismatch_reports_encoding() {
    let (ext, errors) = detect_extension(&tar_bytes(), &[OutputTag::Json]);
    assert_eq!(ext, "");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].format, OutputTag::Json);
    assert!(errors[0].message.contains("utf-8"));
}

#[test]
fn explicit_list_collects_all_errors() {
    let (ext, errors) = detect_extension(b"foo: bar", &[OutputTag::Toml, OutputTag::Json]);
    assert_eq!(ext, "");
    let formats: Vec<_> = errors.iter().map(|error| error.format).collect();
    assert_eq!(formats, vec![OutputTag::Toml, OutputTag::Json]);
}

#[test]
fn explicit_tar_accepts_gzipped() {
    let (ext, errors) = detect_extension(&tar_gz_bytes(), &[OutputTag::Tar]);
    assert_eq!(ext, ".tar.gz");
    assert!(errors.is_empty());
}

#[test]
fn identifier_embeds_stamp_and_name() {
    let at = chrono::Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap();
    let path = result_identifier(Path::new("/results"), "run-me", at);
    assert_eq!(
        path,
        PathBuf::from(format!("/results/result-{}-20210304T050607-run-me", at.timestamp()))
    );
}

#[test]
fn tag_names_round_trip() {
    for name in OutputTag::NAMES {
        let tag: OutputTag = name.parse().unwrap();
        assert_eq!(&tag.to_string(), name);
    }
}
