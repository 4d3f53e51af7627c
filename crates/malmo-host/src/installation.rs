//! Checks that the schema files match the platform version.

use crate::error::MissionError;
use crate::xml::XmlError;
use malmo_types::MALMO_VERSION;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const XSD_PATH_ENV: &str = "MALMO_XSD_PATH";

const SCHEMA_FILES: [&str; 2] = ["MissionInit.xsd", "MissionEnded.xsd"];

/// Verifies that `schema_dir` holds the control schemas and that their
/// `version` attribute agrees with [`MALMO_VERSION`] on major and minor.
pub fn check_installation(schema_dir: &Path) -> Result<(), MissionError> {
    for name in SCHEMA_FILES {
        let path = schema_dir.join(name);
        let contents = std::fs::read_to_string(&path).map_err(|e| {
            MissionError::BadInstallation(format!(
                "schema file {} could not be read: {e}",
                path.display()
            ))
        })?;
        let version = schema_version(&contents)
            .map_err(|e| MissionError::BadInstallation(format!("{}: {e}", path.display())))?
            .ok_or_else(|| {
                MissionError::BadInstallation(format!("{} has no version attribute", path.display()))
            })?;
        if major_minor(&version) != major_minor(MALMO_VERSION) {
            return Err(MissionError::BadInstallation(format!(
                "{} is version {version} but this platform is {MALMO_VERSION}",
                path.display()
            )));
        }
    }
    Ok(())
}

/// Runs [`check_installation`] once per process and caches the outcome.
///
/// The check is skipped when no schema directory is configured and
/// `MALMO_XSD_PATH` is unset.
pub fn check_installation_once(configured: Option<&Path>) -> Result<(), MissionError> {
    static OUTCOME: OnceLock<Result<(), String>> = OnceLock::new();

    let schema_dir: Option<PathBuf> = configured
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(XSD_PATH_ENV).map(PathBuf::from));
    let Some(schema_dir) = schema_dir else {
        return Ok(());
    };

    OUTCOME
        .get_or_init(|| {
            let outcome = check_installation(&schema_dir);
            match &outcome {
                Ok(()) => tracing::info!(path = %schema_dir.display(), "installation check passed"),
                Err(e) => tracing::error!(error = %e, "installation check failed"),
            }
            outcome.map_err(|e| match e {
                MissionError::BadInstallation(reason) => reason,
                other => other.to_string(),
            })
        })
        .clone()
        .map_err(MissionError::BadInstallation)
}

fn schema_version(xml: &str) -> Result<Option<String>, XmlError> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event()? {
            Event::Start(start) | Event::Empty(start) => {
                for attribute in start.attributes() {
                    let attribute = attribute?;
                    if attribute.key.local_name().as_ref() == b"version" {
                        return Ok(Some(attribute.unescape_value()?.into_owned()));
                    }
                }
                return Ok(None);
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

fn major_minor(version: &str) -> (&str, &str) {
    let mut parts = version.split('.');
    (parts.next().unwrap_or(""), parts.next().unwrap_or(""))
}
