//! Translation between wire files and the sandbox filesystem.
//!
//! Inbound files are validated and decoded before the engine is touched.
//! Outbound files are every file under home that is neither a seed file nor
//! one of the request's inputs.

use crate::error::GlasshouseError;
use crate::sandbox::{DefaultFileSnapshot, Engine, EngineError};
use crate::types::{InputFile, WireFile};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::collections::HashSet;

/// An input file ready to be written into the sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFile {
    /// Path relative to home.
    pub name: String,
    /// Decoded contents.
    pub bytes: Vec<u8>,
}

/// Checks that `name` is a relative path that stays inside home.
///
/// # Errors
///
/// Returns the reason the name is rejected.
pub fn validate_filename(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("filename is empty".to_string());
    }
    if name.starts_with('/') {
        return Err(format!("filename '{name}' must be relative"));
    }
    if name.contains('\\') {
        return Err(format!("filename '{name}' must use '/' as separator"));
    }
    if name
        .split('/')
        .any(|component| component.is_empty() || component == "." || component == "..")
    {
        return Err(format!(
            "filename '{name}' must not contain empty, '.' or '..' components"
        ));
    }
    Ok(())
}

/// Validates and decodes every entry of a request's `files` array.
///
/// # Errors
///
/// Returns a parsing error naming the first offending entry.
pub fn decode_inputs(files: &[InputFile]) -> Result<Vec<DecodedFile>, GlasshouseError> {
    let mut seen = HashSet::new();
    let mut decoded = Vec::with_capacity(files.len());

    for (index, file) in files.iter().enumerate() {
        let name = file.filename.as_deref().ok_or_else(|| {
            GlasshouseError::parsing(format!("files[{index}] is missing 'filename'"))
        })?;
        validate_filename(name)
            .map_err(|reason| GlasshouseError::parsing(format!("files[{index}]: {reason}")))?;

        let data = file.b64_data.as_deref().ok_or_else(|| {
            GlasshouseError::parsing(format!("files[{index}] ('{name}') is missing 'b64_data'"))
        })?;
        let bytes = STANDARD.decode(data).map_err(|e| {
            GlasshouseError::parsing(format!("files[{index}] ('{name}'): invalid base64: {e}"))
        })?;

        if !seen.insert(name) {
            return Err(GlasshouseError::parsing(format!(
                "files[{index}]: duplicate filename '{name}'"
            )));
        }
        decoded.push(DecodedFile {
            name: name.to_string(),
            bytes,
        });
    }

    Ok(decoded)
}

/// Encodes bytes for the wire.
#[must_use]
pub fn encode(filename: impl Into<String>, bytes: &[u8]) -> WireFile {
    WireFile {
        filename: filename.into(),
        b64_data: STANDARD.encode(bytes),
    }
}

/// Decodes a wire file's payload.
///
/// # Errors
///
/// Returns a parsing error if the payload is not standard base64.
pub fn decode(file: &WireFile) -> Result<Vec<u8>, GlasshouseError> {
    STANDARD.decode(&file.b64_data).map_err(|e| {
        GlasshouseError::parsing(format!("'{}': invalid base64: {}", file.filename, e))
    })
}

/// Lists every file under home that the code produced.
///
/// Walks home recursively, skipping `.`/`..` and excluding seed names and
/// `inputs`. Results are sorted by filename.
///
/// # Errors
///
/// Fails if a listed entry cannot be read back.
pub fn collect_outputs(
    engine: &dyn Engine,
    snapshot: &DefaultFileSnapshot,
    inputs: &HashSet<&str>,
) -> Result<Vec<WireFile>, EngineError> {
    let mut outputs = Vec::new();
    let mut pending = vec![String::new()];

    while let Some(dir) = pending.pop() {
        for entry in engine.read_dir(&dir)? {
            if entry.is_marker() {
                continue;
            }
            let path = if dir.is_empty() {
                entry.name
            } else {
                format!("{dir}/{}", entry.name)
            };

            if entry.is_dir {
                pending.push(path);
            } else if !snapshot.contains(&path) && !inputs.contains(path.as_str()) {
                let bytes = engine.read_file(&path)?;
                outputs.push(encode(path, &bytes));
            }
        }
    }

    outputs.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{BootOptions, EngineFactory, InterruptSignal, RhaiEngineFactory, SeedFile};

    fn input(name: &str, data: &str) -> InputFile {
        InputFile {
            filename: Some(name.to_string()),
            b64_data: Some(data.to_string()),
        }
    }

    #[test]
    fn validate_filename_accepts_nested_relative_paths() {
        assert!(validate_filename("a.txt").is_ok());
        assert!(validate_filename("dir/sub/b.bin").is_ok());
        assert!(validate_filename(".hidden").is_ok());
    }

    #[test]
    fn validate_filename_rejects_escapes() {
        for name in ["", "/etc/passwd", "..", "../x", "a/../b", "a//b", "./a", "a/", "a\\b"] {
            assert!(validate_filename(name).is_err(), "accepted {name:?}");
        }
    }

    #[test]
    fn decode_inputs_round_trips_bytes() {
        let bytes: Vec<u8> = (0..=255).collect();
        let wire = encode("blob.bin", &bytes);
        let decoded = decode_inputs(&[input("blob.bin", &wire.b64_data)]).unwrap();

        assert_eq!(decoded[0].name, "blob.bin");
        assert_eq!(decoded[0].bytes, bytes);
        assert_eq!(decode(&wire).unwrap(), bytes);
    }

    #[test]
    fn decode_inputs_reports_entry_index() {
        let missing = InputFile {
            filename: Some("a.txt".to_string()),
            b64_data: None,
        };
        let error = decode_inputs(&[input("ok.txt", ""), missing]).unwrap_err();
        assert!(error.is_parsing());
        assert!(error.to_string().contains("files[1]"));
        assert!(error.to_string().contains("b64_data"));
    }

    #[test]
    fn decode_inputs_rejects_bad_base64() {
        let error = decode_inputs(&[input("a.txt", "not base64!")]).unwrap_err();
        assert!(error.is_parsing());
        assert!(error.to_string().contains("invalid base64"));
    }

    #[test]
    fn decode_inputs_rejects_duplicates() {
        let error = decode_inputs(&[input("a.txt", ""), input("a.txt", "")]).unwrap_err();
        assert!(error.to_string().contains("duplicate"));
    }

    #[test]
    fn decode_inputs_rejects_escaping_name() {
        let error = decode_inputs(&[input("../a.txt", "")]).unwrap_err();
        assert!(error.is_parsing());
    }

    #[test]
    fn collect_outputs_excludes_seed_and_inputs() {
        let mut engine = RhaiEngineFactory::new()
            .boot(BootOptions::new("/home/sandbox", InterruptSignal::new()))
            .unwrap();
        engine.write_file("seed.txt", b"seed").unwrap();
        engine.write_file("a.txt", b"in").unwrap();
        engine.write_file("b.txt", b"out").unwrap();
        engine.write_file("nested/c.txt", b"deep").unwrap();

        let snapshot = DefaultFileSnapshot::from_files(vec![SeedFile {
            name: "seed.txt".to_string(),
            bytes: b"seed".to_vec(),
        }]);
        let inputs: HashSet<&str> = ["a.txt"].into_iter().collect();

        let outputs = collect_outputs(engine.as_ref(), &snapshot, &inputs).unwrap();
        let names: Vec<&str> = outputs.iter().map(|f| f.filename.as_str()).collect();

        assert_eq!(names, vec!["b.txt", "nested/c.txt"]);
        assert_eq!(decode(&outputs[0]).unwrap(), b"out");
    }
}
