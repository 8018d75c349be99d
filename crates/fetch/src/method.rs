use std::str::FromStr;

use serde::Serialize;

use crate::FetchError;

/// Tool and protocol used for one pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMethod {
    /// Local copy from a shared mount.
    Copy,
    Scp,
    Ftp,
    Ftps,
    Sftp,
    Http,
    Https,
}

impl TransferMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Scp => "scp",
            Self::Ftp => "ftp",
            Self::Ftps => "ftps",
            Self::Sftp => "sftp",
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    /// Extra `lftp` settings appended to the common setup.
    pub(crate) fn lftp_settings(self) -> &'static str {
        match self {
            Self::Ftp => "set ftp:use-feat no; set ftp:use-mdtm no;",
            Self::Ftps => "set ftp:use-feat no; set ftp:use-mdtm no; set ftp:ssl-force yes;",
            Self::Sftp => "set ftp:use-feat no; set ftp:ssl-force yes;",
            Self::Http | Self::Https | Self::Copy | Self::Scp => "",
        }
    }
}

impl FromStr for TransferMethod {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "copy" => Ok(Self::Copy),
            "scp" => Ok(Self::Scp),
            "ftp" => Ok(Self::Ftp),
            "ftps" => Ok(Self::Ftps),
            "sftp" => Ok(Self::Sftp),
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            _ => Err(FetchError::UnsupportedMethod(s.to_string())),
        }
    }
}

impl std::fmt::Display for TransferMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
