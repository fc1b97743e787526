//! Connection parameters and logon preparation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::logging::LogMask;
use crate::password::resolve_password;
use crate::protocol::constants::*;

/// Default database port.
pub const DEFAULT_DBS_PORT: u16 = 1025;

fn default_connect_timeout() -> Duration {
    Duration::from_secs(20)
}

/// Transaction semantics of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Teradata semantics: implicit transactions, `BT`/`ET` for explicit ones.
    Tera,
    /// ANSI semantics: transactions end with `COMMIT`.
    Ansi,
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionMode::Tera => write!(f, "TERA"),
            TransactionMode::Ansi => write!(f, "ANSI"),
        }
    }
}

/// Connection parameters.
///
/// Every value is a string, matching the JSON object accepted by
/// [`ConnectParams::from_json`]. Values are validated when the connection is
/// opened, not when they are set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectParams {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dbs_port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryptdata: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fake_result_sets: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lob_support: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logdata: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logmech: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_message_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sip_support: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teradata_values: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmode: Option<String>,
    /// Limit on session creation (default: 20 seconds).
    #[serde(skip, default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    /// Limit on each request; unlimited when `None`.
    #[serde(skip)]
    pub request_timeout: Option<Duration>,
}

impl Default for ConnectParams {
    fn default() -> Self {
        Self {
            host: String::new(),
            user: None,
            password: None,
            account: None,
            column_name: None,
            dbs_port: None,
            encryptdata: None,
            fake_result_sets: None,
            lob_support: None,
            log: None,
            logdata: None,
            logmech: None,
            max_message_body: None,
            partition: None,
            sip_support: None,
            teradata_values: None,
            tmode: None,
            connect_timeout: default_connect_timeout(),
            request_timeout: None,
        }
    }
}

impl ConnectParams {
    /// Create connection parameters for a host.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    /// Parse a JSON object of string values.
    ///
    /// # Example
    ///
    /// ```
    /// use teradatasql_rs::ConnectParams;
    ///
    /// let params = ConnectParams::from_json(
    ///     r#"{"host":"whomooz","user":"guest","password":"please","log":"0"}"#,
    /// ).unwrap();
    /// assert_eq!(params.user.as_deref(), Some("guest"));
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::connect_param("json", e.to_string()))
    }

    /// Serialize to the JSON object form.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    pub fn with_dbs_port(mut self, port: u16) -> Self {
        self.dbs_port = Some(port.to_string());
        self
    }

    /// Set the log bitmask (1 trace, 2 debug, 4 dump).
    pub fn with_log(mut self, mask: u32) -> Self {
        self.log = Some(mask.to_string());
        self
    }

    pub fn with_logmech(mut self, logmech: impl Into<String>) -> Self {
        self.logmech = Some(logmech.into());
        self
    }

    pub fn with_logdata(mut self, logdata: impl Into<String>) -> Self {
        self.logdata = Some(logdata.into());
        self
    }

    /// Set the transaction mode (`DEFAULT`, `ANSI` or `TERA`).
    pub fn with_tmode(mut self, tmode: impl Into<String>) -> Self {
        self.tmode = Some(tmode.into());
        self
    }

    /// Return fake result sets for every request.
    pub fn with_fake_result_sets(mut self, enabled: bool) -> Self {
        self.fake_result_sets = Some(enabled.to_string());
        self
    }

    /// Set the connection timeout.
    ///
    /// # Example
    ///
    /// ```
    /// use teradatasql_rs::ConnectParams;
    /// use std::time::Duration;
    ///
    /// let params = ConnectParams::new("whomooz")
    ///     .with_connect_timeout(Duration::from_secs(5));
    /// ```
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set a limit on each request.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Check every value, returning the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::connect_param("host", "host is required"));
        }
        self.log_mask()?;
        self.port()?;
        self.transaction_mode()?;
        for (name, value) in [
            ("column_name", &self.column_name),
            ("encryptdata", &self.encryptdata),
            ("fake_result_sets", &self.fake_result_sets),
            ("lob_support", &self.lob_support),
            ("sip_support", &self.sip_support),
            ("teradata_values", &self.teradata_values),
        ] {
            parse_bool(name, value.as_deref(), false)?;
        }
        if let Some(body) = &self.max_message_body {
            body.trim().parse::<u32>().map_err(|_| {
                Error::connect_param("max_message_body", format!("Invalid max_message_body value {}", body))
            })?;
        }
        Ok(())
    }

    /// Log mask from the `log` value.
    pub fn log_mask(&self) -> Result<LogMask> {
        match self.log.as_deref().map(str::trim) {
            None | Some("") => Ok(LogMask::default()),
            Some(text) => text
                .parse::<u32>()
                .map(LogMask::new)
                .map_err(|_| Error::connect_param("log", format!("Invalid log value {}", text))),
        }
    }

    /// Database port from `dbs_port`.
    pub fn port(&self) -> Result<u16> {
        match self.dbs_port.as_deref().map(str::trim) {
            None | Some("") => Ok(DEFAULT_DBS_PORT),
            Some(text) => text
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| {
                    Error::connect_param("dbs_port", format!("Invalid dbs_port value {}", text))
                }),
        }
    }

    /// Transaction mode from `tmode`. `DEFAULT` selects Teradata semantics.
    pub fn transaction_mode(&self) -> Result<TransactionMode> {
        match self.tmode.as_deref().map(str::trim) {
            None | Some("") => Ok(TransactionMode::Tera),
            Some(text) => match text.to_ascii_uppercase().as_str() {
                "DEFAULT" | "TERA" => Ok(TransactionMode::Tera),
                "ANSI" => Ok(TransactionMode::Ansi),
                _ => Err(Error::connect_param(
                    "tmode",
                    format!("Invalid tmode value {}", text),
                )),
            },
        }
    }

    /// Whether every request returns fake result sets.
    pub fn fake_result_sets_enabled(&self) -> Result<bool> {
        parse_bool("fake_result_sets", self.fake_result_sets.as_deref(), false)
    }

    /// Validate and resolve stored password protection in `password` and
    /// `logdata`, producing the parameters handed to the binding.
    pub async fn prepare_logon(&self) -> Result<ConnectParams> {
        self.validate()?;
        let mut resolved = self.clone();
        if let Some(password) = &self.password {
            resolved.password = Some(resolve_password(password).await?);
        }
        if let Some(logdata) = &self.logdata {
            resolved.logdata = Some(resolve_password(logdata).await?);
        }
        Ok(resolved)
    }
}

fn parse_bool(name: &str, value: Option<&str>, default: bool) -> Result<bool> {
    match value.map(str::trim) {
        None | Some("") => Ok(default),
        Some(v) if v.eq_ignore_ascii_case("true") => Ok(true),
        Some(v) if v.eq_ignore_ascii_case("false") => Ok(false),
        Some(v) => Err(Error::connect_param(
            name,
            format!("Invalid {} value {}", name, v),
        )),
    }
}

/// Identity of the client process, sent with each logon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAttributes {
    pub program_name: String,
    pub driver_version: String,
    pub os_user: String,
    pub client_host: String,
    pub process_id: u32,
}

impl ClientAttributes {
    /// Collect attributes of the current process.
    pub fn current() -> Self {
        let client_host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "localhost".to_string());
        Self {
            program_name: CLIENT_PROGRAM_NAME.to_string(),
            driver_version: DRIVER_VERSION.to_string(),
            os_user: whoami::username(),
            client_host,
            process_id: std::process::id(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_connect_params_default_timeout() {
        let params = ConnectParams::new("localhost");
        assert_eq!(params.connect_timeout, Duration::from_secs(20));
        assert_eq!(params.request_timeout, None);
    }

    #[test]
    fn test_connect_params_custom_timeout() {
        let params = ConnectParams::new("localhost")
            .with_connect_timeout(Duration::from_secs(5))
            .with_request_timeout(Duration::from_secs(1));
        assert_eq!(params.connect_timeout, Duration::from_secs(5));
        assert_eq!(params.request_timeout, Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_from_json_preserves_default_timeout() {
        let params = ConnectParams::from_json(r#"{"host":"h","tmode":"ANSI","dbs_port":"1025"}"#).unwrap();
        assert_eq!(params.connect_timeout, Duration::from_secs(20));
        assert_eq!(params.transaction_mode().unwrap(), TransactionMode::Ansi);
        assert_eq!(params.port().unwrap(), 1025);
    }

    #[test]
    fn test_from_json_rejects_unknown_keys() {
        let err = ConnectParams::from_json(r#"{"host":"h","charset":"ASCII"}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[test]
    fn test_json_skips_absent_values() {
        let json = ConnectParams::new("h").with_user("u").to_json().unwrap();
        assert_eq!(json, r#"{"host":"h","user":"u"}"#);
    }

    #[test]
    fn test_validation() {
        assert!(ConnectParams::new("h").validate().is_ok());
        assert!(ConnectParams::new(" ").validate().is_err());

        let err = ConnectParams::new("h").with_tmode("INVALID").validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert!(err.to_string().contains("INVALID"));

        let mut params = ConnectParams::new("h");
        params.log = Some("verbose".into());
        assert!(params.validate().is_err());

        let mut params = ConnectParams::new("h");
        params.dbs_port = Some("70000".into());
        assert!(params.validate().is_err());

        let mut params = ConnectParams::new("h");
        params.lob_support = Some("yes".into());
        assert!(params.validate().is_err());

        assert!(ConnectParams::new("h").with_fake_result_sets(true).fake_result_sets_enabled().unwrap());
        assert_eq!(ConnectParams::new("h").with_log(6).log_mask().unwrap().bits(), 6);
    }

    #[test]
    fn test_prepare_logon_passes_plain_credentials() {
        let params = ConnectParams::new("h")
            .with_user("guest")
            .with_password("please")
            .with_logdata("authcid=guest password=please");
        let logon = tokio_test::block_on(params.prepare_logon()).unwrap();
        assert_eq!(logon, params);

        let bad = ConnectParams::new("h").with_password("ENCRYPTED_PASSWORD(file:a");
        let err = tokio_test::block_on(bad.prepare_logon()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Interface);
    }

    #[test]
    fn test_client_attributes() {
        let attrs = ClientAttributes::current();
        assert_eq!(attrs.program_name, CLIENT_PROGRAM_NAME);
        assert!(!attrs.client_host.is_empty());
        assert_eq!(attrs.process_id, std::process::id());
    }
}
