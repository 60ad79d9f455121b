//! Package selection and archive reading
//!
//! A KUDO package archive is a gzipped tarball holding `operator.yaml`,
//! `params.yaml` and a `templates/` directory, usually below one top-level
//! directory named after the package.

use crate::error::KudoError;
use crate::models::{IndexFile, PackageArtifact, PackageRef, PackageVersion};
use crds::{
    Maintainer, Operator, OperatorReference, OperatorSpec, OperatorVersion, OperatorVersionSpec,
    Parameter, operator_version_name,
};
use flate2::read::GzDecoder;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Read;
use tar::Archive;
use tracing::debug;

const OPERATOR_FILE: &str = "operator.yaml";
const PARAMS_FILE: &str = "params.yaml";
const TEMPLATES_DIR: &str = "templates/";

/// `operator.yaml`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperatorFile {
    name: String,
    #[serde(alias = "version")]
    operator_version: String,
    #[serde(default)]
    app_version: Option<String>,
    #[serde(default)]
    kudo_version: Option<String>,
    #[serde(default)]
    kubernetes_version: Option<String>,
    #[serde(default)]
    maintainers: Vec<Maintainer>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tasks: Vec<Value>,
    #[serde(default)]
    plans: BTreeMap<String, Value>,
}

/// `params.yaml`
#[derive(Debug, Default, Deserialize)]
struct ParamsFile {
    #[serde(default)]
    parameters: Vec<Parameter>,
}

/// Pick the index entry matching `package`.
///
/// Entries are filtered by the requested operator and app versions; among the
/// remaining ones the highest operator version wins.
pub fn select_version<'a>(
    index: &'a IndexFile,
    package: &PackageRef,
) -> Result<&'a PackageVersion, KudoError> {
    let versions = index
        .entries
        .get(&package.name)
        .ok_or_else(|| KudoError::PackageNotFound(package.name.clone()))?;

    versions
        .iter()
        .filter(|v| {
            package
                .operator_version
                .as_deref()
                .is_none_or(|wanted| v.operator_version == wanted)
        })
        .filter(|v| {
            package
                .app_version
                .as_deref()
                .is_none_or(|wanted| v.app_version.as_deref() == Some(wanted))
        })
        .max_by(|a, b| version_key(&a.operator_version).cmp(&version_key(&b.operator_version)))
        .ok_or_else(|| KudoError::PackageNotFound(describe(package)))
}

/// Unparseable versions sort below every valid one
fn version_key(version: &str) -> Option<semver::Version> {
    semver::Version::parse(version.trim_start_matches('v')).ok()
}

fn describe(package: &PackageRef) -> String {
    format!(
        "{} (operatorVersion {}, appVersion {})",
        package.name,
        package.operator_version.as_deref().unwrap_or("any"),
        package.app_version.as_deref().unwrap_or("any")
    )
}

/// Read every regular file of a gzipped tarball into memory
pub fn unpack(archive: &[u8]) -> Result<BTreeMap<String, String>, KudoError> {
    let mut files = BTreeMap::new();
    let mut archive = Archive::new(GzDecoder::new(archive));
    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path = entry.path()?.to_string_lossy().trim_start_matches("./").to_string();
        let mut content = String::new();
        entry.read_to_string(&mut content)?;
        files.insert(path, content);
    }
    debug!(files = files.len(), "Unpacked package archive");
    Ok(files)
}

/// Build the package resources from unpacked files
pub fn from_files(files: &BTreeMap<String, String>) -> Result<PackageArtifact, KudoError> {
    // The package root is the directory holding the shallowest operator.yaml
    let (operator_path, operator_content) = files
        .iter()
        .filter(|(path, _)| *path == OPERATOR_FILE || path.ends_with(&format!("/{OPERATOR_FILE}")))
        .min_by_key(|(path, _)| path.matches('/').count())
        .ok_or_else(|| KudoError::InvalidPackage(format!("{OPERATOR_FILE} not found")))?;
    let root = operator_path.trim_end_matches(OPERATOR_FILE);

    let operator_file: OperatorFile = serde_yaml::from_str(operator_content)?;
    let params_file: ParamsFile = match files.get(&format!("{root}{PARAMS_FILE}")) {
        Some(content) => serde_yaml::from_str(content)?,
        None => ParamsFile::default(),
    };

    let templates_prefix = format!("{root}{TEMPLATES_DIR}");
    let templates = files
        .iter()
        .filter_map(|(path, content)| {
            path.strip_prefix(&templates_prefix)
                .map(|name| (name.to_string(), content.clone()))
        })
        .collect();

    Ok(build_artifact(operator_file, params_file.parameters, templates))
}

/// Unpack and parse a package archive
pub fn read_archive(archive: &[u8]) -> Result<PackageArtifact, KudoError> {
    from_files(&unpack(archive)?)
}

fn build_artifact(
    file: OperatorFile,
    parameters: Vec<Parameter>,
    templates: BTreeMap<String, String>,
) -> PackageArtifact {
    let app_version = file.app_version.unwrap_or_default();
    let operator = Operator::new(
        &file.name,
        OperatorSpec {
            description: file.description,
            kudo_version: file.kudo_version,
            kubernetes_version: file.kubernetes_version,
            maintainers: file.maintainers,
            url: file.url,
        },
    );
    let operator_version = OperatorVersion::new(
        &operator_version_name(&file.name, &app_version, &file.operator_version),
        OperatorVersionSpec {
            operator: OperatorReference {
                name: file.name.clone(),
                kind: Some("Operator".to_string()),
            },
            version: file.operator_version,
            app_version,
            templates,
            tasks: file.tasks,
            parameters,
            plans: file.plans,
        },
    );
    PackageArtifact {
        operator,
        operator_version,
    }
}
