// Credential bundle and on-disk cookie store
//
// The login flow hands a CredentialBundle to the caller, which persists it
// here. The downloader asks the store for a cookie file to pass to yt-dlp.
//
// Lookup order for the downloader:
// 1. Netscape cookie file (what yt-dlp reads natively)
// 2. JSON name->value file, converted into the Netscape file on demand
// 3. No cookies

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const NETSCAPE_HEADER: &str = "# Netscape HTTP Cookie File";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential file I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("credential file {path} is not a valid cookie map: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Cookie name -> value mapping produced by a successful login.
///
/// Opaque to the login controller: it never inspects individual cookies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialBundle(BTreeMap<String, String>);

impl CredentialBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Merge a `Cookie:` header value ("a=1; b=2") into the bundle.
    pub fn extend_from_header(&mut self, header: &str) {
        for pair in header.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=') {
                let name = name.trim();
                if !name.is_empty() {
                    self.insert(name, value.trim());
                }
            }
        }
    }

    /// Render as a Netscape cookie file for `domain`.
    ///
    /// Expiry 0 marks session cookies; yt-dlp loads them anyway.
    pub fn to_netscape(&self, domain: &str) -> String {
        let include_subdomains = if domain.starts_with('.') { "TRUE" } else { "FALSE" };
        let mut content = format!("{}\n", NETSCAPE_HEADER);
        for (name, value) in self.iter() {
            content.push_str(&format!(
                "{}\t{}\t/\tFALSE\t0\t{}\t{}\n",
                domain, include_subdomains, name, value
            ));
        }
        content
    }
}

/// File-backed credential store shared by the login and download flows.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    netscape_path: PathBuf,
    json_path: PathBuf,
    cookie_domain: String,
}

impl CredentialStore {
    pub fn new(
        netscape_path: impl Into<PathBuf>,
        json_path: impl Into<PathBuf>,
        cookie_domain: impl Into<String>,
    ) -> Self {
        Self {
            netscape_path: netscape_path.into(),
            json_path: json_path.into(),
            cookie_domain: cookie_domain.into(),
        }
    }

    pub fn netscape_path(&self) -> &Path {
        &self.netscape_path
    }

    pub fn json_path(&self) -> &Path {
        &self.json_path
    }

    /// Persist a bundle as both the JSON map and the Netscape cookie file.
    pub fn save(&self, bundle: &CredentialBundle) -> Result<(), CredentialError> {
        let json = serde_json::to_string_pretty(bundle).map_err(|source| CredentialError::Json {
            path: self.json_path.clone(),
            source,
        })?;
        write_file(&self.json_path, &json)?;
        write_file(&self.netscape_path, &bundle.to_netscape(&self.cookie_domain))?;

        tracing::info!(
            cookies = bundle.len(),
            path = %self.netscape_path.display(),
            "[Credentials] Saved login cookies"
        );
        Ok(())
    }

    /// Load the JSON bundle, if one was saved.
    pub fn load(&self) -> Result<Option<CredentialBundle>, CredentialError> {
        if !self.json_path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.json_path).map_err(|source| CredentialError::Io {
            path: self.json_path.clone(),
            source,
        })?;
        let bundle = serde_json::from_str(&raw).map_err(|source| CredentialError::Json {
            path: self.json_path.clone(),
            source,
        })?;
        Ok(Some(bundle))
    }

    pub fn is_logged_in(&self) -> bool {
        self.netscape_path.exists() || self.json_path.exists()
    }

    /// Cookie file for the download engine, following the store's lookup order.
    pub fn cookie_file(&self) -> Result<Option<PathBuf>, CredentialError> {
        if self.netscape_path.exists() {
            return Ok(Some(self.netscape_path.clone()));
        }

        match self.load()? {
            Some(bundle) => {
                tracing::info!(
                    from = %self.json_path.display(),
                    to = %self.netscape_path.display(),
                    "[Credentials] Converting JSON cookies to Netscape format"
                );
                write_file(&self.netscape_path, &bundle.to_netscape(&self.cookie_domain))?;
                Ok(Some(self.netscape_path.clone()))
            }
            None => Ok(None),
        }
    }

    /// Remove both credential files. Missing files are not an error.
    pub fn clear(&self) -> Result<(), CredentialError> {
        for path in [&self.netscape_path, &self.json_path] {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(CredentialError::Io {
                        path: path.clone(),
                        source,
                    })
                }
            }
        }
        Ok(())
    }
}

fn write_file(path: &Path, content: &str) -> Result<(), CredentialError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| CredentialError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, content).map_err(|source| CredentialError::Io {
        path: path.to_path_buf(),
        source,
    })
}
