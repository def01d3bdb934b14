use serde::{Deserialize, Serialize};

use crate::Planet;

/// Observer location sent with `location/setlocationfields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub name: String,
    pub country: String,
    pub planet: Planet,
}

/// Outbound commands understood by the remote simulator.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    RunScript {
        id: String,
    },
    /// Set the clock; `julian_day` of `None` changes only the rate.
    SetTime {
        julian_day: Option<f64>,
        time_rate: f64,
    },
    SetFov {
        fov: f64,
    },
    /// View direction in radians.
    SetView {
        az: f64,
        alt: f64,
    },
    SetLocationById {
        id: String,
    },
    SetLocation(SiteLocation),
    DoAction {
        id: String,
    },
    SetProperty {
        id: String,
        value: String,
    },
}

/// Command families; backoff is tracked per family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    RunScript,
    SetTime,
    SetFov,
    SetView,
    SetLocation,
    DoAction,
    SetProperty,
}

impl CommandKind {
    pub fn label(self) -> &'static str {
        match self {
            CommandKind::RunScript => "run_script",
            CommandKind::SetTime => "set_time",
            CommandKind::SetFov => "set_fov",
            CommandKind::SetView => "set_view",
            CommandKind::SetLocation => "set_location",
            CommandKind::DoAction => "do_action",
            CommandKind::SetProperty => "set_property",
        }
    }
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::RunScript { .. } => CommandKind::RunScript,
            Command::SetTime { .. } => CommandKind::SetTime,
            Command::SetFov { .. } => CommandKind::SetFov,
            Command::SetView { .. } => CommandKind::SetView,
            Command::SetLocationById { .. } | Command::SetLocation(_) => CommandKind::SetLocation,
            Command::DoAction { .. } => CommandKind::DoAction,
            Command::SetProperty { .. } => CommandKind::SetProperty,
        }
    }

    /// Endpoint path below the API prefix.
    pub fn endpoint(&self) -> &'static str {
        match self.kind() {
            CommandKind::RunScript => "scripts/run",
            CommandKind::SetTime => "main/time",
            CommandKind::SetFov => "main/fov",
            CommandKind::SetView => "main/view",
            CommandKind::SetLocation => "location/setlocationfields",
            CommandKind::DoAction => "stelaction/do",
            CommandKind::SetProperty => "stelproperty/set",
        }
    }

    /// Form fields of the POST body, in the order the remote documents them.
    pub fn form(&self) -> Vec<(&'static str, String)> {
        match self {
            Command::RunScript { id } => vec![("id", id.clone())],
            Command::SetTime {
                julian_day,
                time_rate,
            } => {
                let mut fields = Vec::with_capacity(2);
                if let Some(jd) = julian_day {
                    fields.push(("time", jd.to_string()));
                }
                fields.push(("timerate", time_rate.to_string()));
                fields
            }
            Command::SetFov { fov } => vec![("fov", fov.to_string())],
            Command::SetView { az, alt } => vec![("az", az.to_string()), ("alt", alt.to_string())],
            Command::SetLocationById { id } => vec![("id", id.clone())],
            Command::SetLocation(site) => vec![
                ("latitude", site.latitude.to_string()),
                ("longitude", site.longitude.to_string()),
                ("altitude", site.altitude.to_string()),
                ("name", site.name.clone()),
                ("country", site.country.clone()),
                ("planet", site.planet.to_string()),
            ],
            Command::DoAction { id } => vec![("id", id.clone())],
            Command::SetProperty { id, value } => {
                vec![("id", id.clone()), ("value", value.clone())]
            }
        }
    }

    /// Whether the reply body signals that the remote applied the command.
    pub fn accepts(&self, reply: &str) -> bool {
        let reply = reply.trim();
        match self.kind() {
            CommandKind::SetLocation => reply.starts_with("ok"),
            CommandKind::DoAction => matches!(reply, "true" | "false" | "ok"),
            _ => reply == "ok",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(command: &Command) -> String {
        let fields: Vec<String> = command
            .form()
            .into_iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        format!("POST {} {}", command.endpoint(), fields.join("&"))
    }

    #[test]
    fn time_command_omits_missing_julian_day() {
        let shift = Command::SetTime {
            julian_day: Some(2460000.5),
            time_rate: 0.0,
        };
        insta::assert_snapshot!(render(&shift), @"POST main/time time=2460000.5&timerate=0");

        let rate_only = Command::SetTime {
            julian_day: None,
            time_rate: 10.0,
        };
        insta::assert_snapshot!(render(&rate_only), @"POST main/time timerate=10");
    }

    #[test]
    fn location_fields_carry_planet_name() {
        let command = Command::SetLocation(SiteLocation {
            latitude: 48.2,
            longitude: 16.25,
            altitude: 280.0,
            name: "Bridge".into(),
            country: "Austria".into(),
            planet: Planet::Earth,
        });
        insta::assert_snapshot!(
            render(&command),
            @"POST location/setlocationfields latitude=48.2&longitude=16.25&altitude=280&name=Bridge&country=Austria&planet=Earth"
        );
    }

    #[test]
    fn reply_acceptance_depends_on_family() {
        let action = Command::DoAction {
            id: "actionShow_Ground".into(),
        };
        assert!(action.accepts("true"));
        assert!(action.accepts("false"));
        assert!(!action.accepts("error"));

        let location = Command::SetLocationById {
            id: "Vienna, Austria".into(),
        };
        assert!(location.accepts("ok, location set"));

        let view = Command::SetView { az: 1.0, alt: 0.5 };
        assert!(view.accepts("ok\n"));
        assert!(!view.accepts("ok, maybe"));
    }
}
