//! Dispatch transport for daemon control channels.
//!
//! The orchestrator talks to Kea through the control agent's JSON over
//! HTTP interface, one POST per command. The transport makes a single
//! attempt; timeouts and connection failures surface to the caller as
//! transport errors and are never retried here.

use std::time::Duration;

use crate::app::AppRef;
use crate::error::{Result, RoostError};
use crate::kea::command::{decode_response_list, KeaCommand, KeaResponse};

/// Round trip budget for one control command.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Seam between target modules and the network. Production uses
/// [`HttpDispatcher`]; tests substitute a recording fake.
pub trait CommandDispatcher {
    /// Send `command` to the app's control endpoint and return the
    /// per-daemon responses, in the order of the command's service list.
    fn dispatch(&self, app: &AppRef, command: &KeaCommand) -> Result<Vec<KeaResponse>>;
}

#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    client: reqwest::blocking::Client,
}

impl HttpDispatcher {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RoostError::HttpClient(e.to_string()))?;
        Ok(Self { client })
    }
}

impl CommandDispatcher for HttpDispatcher {
    fn dispatch(&self, app: &AppRef, command: &KeaCommand) -> Result<Vec<KeaResponse>> {
        let url = app.control_url()?;
        tracing::debug!(app = %app.name, command = %command.command, %url, "dispatching control command");
        let response = self
            .client
            .post(&url)
            .json(command)
            .send()
            .map_err(|e| RoostError::Transport {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        let status = response.status();
        let body = response.text().map_err(|e| RoostError::Transport {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        if !status.is_success() {
            return Err(RoostError::Transport {
                url,
                reason: format!("control agent answered HTTP {status}"),
            });
        }
        decode_response_list(&command.command, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{AccessPoint, AppKind};
    use serde_json::json;

    fn app_for(server: &mockito::ServerGuard) -> AppRef {
        let addr = server.socket_address();
        AppRef {
            id: 1,
            name: "kea@fixture".to_string(),
            kind: AppKind::Kea,
            access_points: vec![AccessPoint::control(
                addr.ip().to_string(),
                addr.port(),
                false,
            )],
        }
    }

    #[test]
    fn dispatch_posts_command_and_decodes_responses() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::Json(json!({
                "command": "reservation-add",
                "service": ["dhcp4"],
                "arguments": {"reservation": {"subnet-id": 0}},
            })))
            .with_status(200)
            .with_body(r#"[{"result": 0, "text": "Host added."}]"#)
            .create();

        let dispatcher = HttpDispatcher::new().unwrap();
        let command = KeaCommand::new(
            "reservation-add",
            vec!["dhcp4".to_string()],
            Some(json!({"reservation": {"subnet-id": 0}})),
        );
        let responses = dispatcher.dispatch(&app_for(&server), &command).unwrap();
        mock.assert();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].result, 0);
        assert_eq!(responses[0].text.as_deref(), Some("Host added."));
    }

    #[test]
    fn non_success_status_is_a_transport_error() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/")
            .with_status(500)
            .with_body("boom")
            .create();

        let dispatcher = HttpDispatcher::new().unwrap();
        let command = KeaCommand::new("list-commands", Vec::new(), None);
        let err = dispatcher
            .dispatch(&app_for(&server), &command)
            .unwrap_err();
        assert!(matches!(err, RoostError::Transport { .. }), "{err}");
        assert!(err.to_string().contains("HTTP 500"));
    }

    #[test]
    fn unreachable_agent_is_a_transport_error() {
        let server = mockito::Server::new();
        let app = app_for(&server);
        drop(server);

        let dispatcher = HttpDispatcher::with_timeout(Duration::from_secs(1)).unwrap();
        let command = KeaCommand::new("list-commands", Vec::new(), None);
        let err = dispatcher.dispatch(&app, &command).unwrap_err();
        assert!(err.to_string().starts_with("cannot reach http://"), "{err}");
    }

    #[test]
    fn undecodable_body_is_a_malformed_response() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body("<html>login required</html>")
            .create();

        let dispatcher = HttpDispatcher::new().unwrap();
        let command = KeaCommand::new("list-commands", Vec::new(), None);
        let err = dispatcher
            .dispatch(&app_for(&server), &command)
            .unwrap_err();
        assert!(matches!(err, RoostError::MalformedResponse { .. }), "{err}");
    }
}
