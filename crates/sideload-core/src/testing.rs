//! Test helpers shared by unit and integration tests.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{RetentionPolicy, SideloadConfig, ToolPaths, WorkDirs, normalize_base_url};
use crate::crypto::EncryptionKey;
use crate::error::Result;
use crate::pipeline::{ToolOutput, ToolRunner};

/// Base URL used by test configurations.
pub const TEST_BASE_URL: &str = "https://sign.example.com";

/// One recorded tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCall {
    /// Value following `switch`, if present.
    pub fn value_of(&self, switch: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == switch)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

/// A [`ToolRunner`] that records calls and simulates the tools by copying
/// the input package to the requested output path.
#[derive(Debug, Default)]
pub struct FakeRunner {
    calls: Mutex<Vec<ToolCall>>,
    failing: Option<(String, String)>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// A runner on which `program` exits with status 1 and `stderr`.
    pub fn failing(program: &str, stderr: &str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: Some((program.to_string(), stderr.to_string())),
        }
    }

    pub fn calls(&self) -> Vec<ToolCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolRunner for FakeRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<ToolOutput> {
        let call = ToolCall {
            program: program.to_string(),
            args: args.to_vec(),
        };
        self.calls.lock().unwrap().push(call.clone());

        if let Some((failing, stderr)) = &self.failing
            && failing == program
        {
            return Ok(ToolOutput {
                exit_code: Some(1),
                stdout: String::new(),
                stderr: stderr.clone(),
            });
        }

        let input = call
            .value_of("-i")
            .or_else(|| call.args.last().map(String::as_str));
        if let (Some(input), Some(output)) = (input, call.value_of("-o")) {
            tokio::fs::copy(input, output).await?;
        }

        Ok(ToolOutput {
            exit_code: Some(0),
            ..Default::default()
        })
    }
}

/// Writes a minimal `.ipa` whose `Info.plist` holds the given string keys.
pub fn write_test_ipa(path: &Path, info: &[(&str, &str)]) -> std::io::Result<()> {
    let mut dict = plist::Dictionary::new();
    for (key, value) in info {
        dict.insert(key.to_string(), plist::Value::String(value.to_string()));
    }
    let mut plist_bytes = Vec::new();
    plist::Value::Dictionary(dict)
        .to_writer_xml(&mut plist_bytes)
        .map_err(std::io::Error::other)?;

    let mut zip = zip::ZipWriter::new(std::fs::File::create(path)?);
    let options = zip::write::FileOptions::default();
    zip.start_file("Payload/Test.app/Test", options)?;
    zip.write_all(b"\xcf\xfa\xed\xfe")?;
    zip.start_file("Payload/Test.app/Info.plist", options)?;
    zip.write_all(&plist_bytes)?;
    zip.finish()?;
    Ok(())
}

/// Configuration rooted at `root` with a fresh key and the given default package.
pub fn test_config(root: &Path, default_package: PathBuf) -> SideloadConfig {
    SideloadConfig {
        base_url: normalize_base_url(TEST_BASE_URL).expect("test base URL is valid"),
        work_dirs: WorkDirs::new(root),
        encryption_key: EncryptionKey::generate(),
        default_package,
        tools: ToolPaths::default(),
        retention: RetentionPolicy {
            max_age: Duration::from_secs(30 * 60),
            interval: Duration::from_secs(30 * 60),
        },
        branding_image_url: "https://img.example.com/brand.png".to_string(),
    }
}
