//! Blox appliance commands
//! This module contains the text commands that can be sent to the appliance

use log::warn;

/// Appliance commands
///
/// On the wire a command is a verb optionally followed by space-delimited
/// arguments. There is no quoting, so an argument containing whitespace is
/// split by the appliance; such commands are still sent verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoxCommand {
    /// List visible Wi-Fi networks (`wifi/list`)
    WifiList,
    /// Current Wi-Fi connection status (`wifi/status`)
    WifiStatus,
    /// Join a Wi-Fi network (`wifi/connect <ssid> <password> <countryCode>`)
    WifiConnect {
        ssid: String,
        password: String,
        country_code: String,
    },
    /// Fetch logs (`logs <json-params>`)
    Logs(String),
    /// Any other command, sent as-is
    Raw(String),
}

impl BoxCommand {
    /// Convert the command to its wire representation
    pub fn to_wire(&self) -> String {
        match self {
            Self::WifiList => "wifi/list".to_string(),
            Self::WifiStatus => "wifi/status".to_string(),
            Self::WifiConnect {
                ssid,
                password,
                country_code,
            } => {
                for (name, arg) in [("ssid", ssid), ("password", password), ("country code", country_code)] {
                    if arg.chars().any(char::is_whitespace) {
                        warn!("Wi-Fi {} contains whitespace and will not survive the space-delimited command format", name);
                    }
                }
                format!("wifi/connect {} {} {}", ssid, password, country_code)
            }
            Self::Logs(params) => format!("logs {}", params),
            Self::Raw(command) => command.clone(),
        }
    }

    /// The verb, used in log lines so passwords never reach the log.
    pub fn verb(&self) -> &str {
        match self {
            Self::WifiList => "wifi/list",
            Self::WifiStatus => "wifi/status",
            Self::WifiConnect { .. } => "wifi/connect",
            Self::Logs(_) => "logs",
            Self::Raw(command) => command.split(' ').next().unwrap_or(""),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format() {
        assert_eq!(BoxCommand::WifiList.to_wire(), "wifi/list");
        assert_eq!(BoxCommand::WifiStatus.to_wire(), "wifi/status");
        assert_eq!(
            BoxCommand::WifiConnect {
                ssid: "home".into(),
                password: "secret".into(),
                country_code: "CA".into(),
            }
            .to_wire(),
            "wifi/connect home secret CA"
        );
        assert_eq!(
            BoxCommand::Logs(r#"{"lines":50}"#.into()).to_wire(),
            r#"logs {"lines":50}"#
        );
    }

    #[test]
    fn whitespace_in_arguments_is_sent_verbatim() {
        let command = BoxCommand::WifiConnect {
            ssid: "my home".into(),
            password: "pw".into(),
            country_code: "US".into(),
        };
        assert_eq!(command.to_wire(), "wifi/connect my home pw US");
        assert_eq!(command.verb(), "wifi/connect");
    }

    #[test]
    fn raw_verb() {
        assert_eq!(BoxCommand::Raw("peerid get".into()).verb(), "peerid");
    }
}
