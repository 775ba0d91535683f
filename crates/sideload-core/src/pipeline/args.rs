//! Argument vectors for the modification (cyan) and signing (zsign) tools.
//!
//! Both builders are pure: they map validated options to an ordered list of
//! arguments without touching the filesystem.

use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};

/// zsign compression level for the signed package.
const SIGNED_COMPRESSION_LEVEL: &str = "5";

/// Optional package modifications requested by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModificationOptions {
    pub name: Option<String>,
    pub version: Option<String>,
    pub bundle_id: Option<String>,
    pub minimum_os: Option<String>,
    pub icon: Option<PathBuf>,
    /// Tweaks or frameworks (`.deb` / `.dylib`) to inject.
    pub inject: Vec<PathBuf>,
    pub remove_supported_devices: bool,
    pub remove_watch_app: bool,
    pub enable_documents: bool,
    pub fake_sign: bool,
    pub thin: bool,
    pub remove_extensions: bool,
    pub remove_encrypted: bool,
    pub ignore_encrypted: bool,
    pub overwrite: bool,
    pub compress_level: Option<u8>,
}

impl ModificationOptions {
    /// True when no modification is requested and the tool must not run.
    pub fn is_empty(&self) -> bool {
        self.switches().is_empty()
    }

    /// Every requested switch, in a fixed order, without the input/output pair.
    fn switches(&self) -> Vec<String> {
        let mut args = Vec::new();

        let valued = [
            ("-n", &self.name),
            ("-v", &self.version),
            ("-b", &self.bundle_id),
            ("-m", &self.minimum_os),
        ];
        for (switch, value) in valued {
            if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                args.push(switch.to_string());
                args.push(value.to_string());
            }
        }

        if let Some(icon) = &self.icon {
            args.push("-k".to_string());
            args.push(path_arg(icon));
        }

        if !self.inject.is_empty() {
            args.push("-f".to_string());
            args.extend(self.inject.iter().map(|p| path_arg(p)));
        }

        let flags = [
            (self.remove_supported_devices, "-u"),
            (self.remove_watch_app, "-w"),
            (self.enable_documents, "-d"),
            (self.fake_sign, "-s"),
            (self.thin, "-q"),
            (self.remove_extensions, "-e"),
            (self.remove_encrypted, "-g"),
            (self.ignore_encrypted, "--ignore-encrypted"),
            (self.overwrite, "--overwrite"),
        ];
        args.extend(
            flags
                .iter()
                .filter(|(set, _)| *set)
                .map(|(_, switch)| switch.to_string()),
        );

        if let Some(level) = self.compress_level {
            args.push("-c".to_string());
            args.push(level.to_string());
        }

        args
    }

    /// Full cyan argument vector, or `None` when nothing is requested.
    pub fn to_args(&self, input: &Path, output: &Path) -> Option<Vec<String>> {
        let switches = self.switches();
        if switches.is_empty() {
            return None;
        }

        let mut args = vec![
            "-i".to_string(),
            path_arg(input),
            "-o".to_string(),
            path_arg(output),
        ];
        args.extend(switches);
        Some(args)
    }
}

/// zsign switches whose values must not be logged.
pub const SIGNER_SECRET_SWITCHES: &[&str] = &["-p"];

/// Inputs for one zsign invocation.
#[derive(Debug)]
pub struct SigningArgs<'a> {
    pub certificate: &'a Path,
    pub profile: Option<&'a Path>,
    pub password: Option<&'a SecretString>,
    pub output: &'a Path,
    pub input: &'a Path,
}

impl SigningArgs<'_> {
    /// zsign argument vector. The password is only added when non-blank.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "-z".to_string(),
            SIGNED_COMPRESSION_LEVEL.to_string(),
            "-k".to_string(),
            path_arg(self.certificate),
        ];

        if let Some(password) = self
            .password
            .map(|p| p.expose_secret())
            .filter(|p| !p.trim().is_empty())
        {
            args.push("-p".to_string());
            args.push(password.to_string());
        }

        if let Some(profile) = self.profile {
            args.push("-m".to_string());
            args.push(path_arg(profile));
        }

        args.push("-o".to_string());
        args.push(path_arg(self.output));
        args.push(path_arg(self.input));
        args
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
