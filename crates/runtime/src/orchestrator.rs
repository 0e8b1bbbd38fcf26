//! Drives one user query through the model and the tool server.

use tracing::debug;

use crate::connection::{ConnectionManager, ConnectionStatus};
use crate::error::QueryError;
use crate::model::{Message, ModelGateway, ModelRequest, Part};
use crate::transport::Launcher;

/// Runs queries against a ready connection.
///
/// History lives for one [`run`](Self::run) call only.
pub struct QueryOrchestrator<'a, G, L: Launcher> {
    connection: &'a ConnectionManager<L>,
    gateway: &'a G,
}

impl<'a, G: ModelGateway, L: Launcher> QueryOrchestrator<'a, G, L> {
    pub fn new(connection: &'a ConnectionManager<L>, gateway: &'a G) -> Self {
        Self {
            connection,
            gateway,
        }
    }

    /// Answer `query`, resolving each requested tool call with one follow-up.
    ///
    /// Tool calls run in the order the model issued them. Each one appends its
    /// result to the shared history before the follow-up, so the follow-up for
    /// a later call sees the results of the earlier ones but not the later
    /// calls themselves. Any failure aborts the query with no partial answer.
    pub async fn run(&self, query: &str) -> Result<String, QueryError> {
        if self.connection.status() != ConnectionStatus::Ready {
            return Err(QueryError::SessionNotReady);
        }

        let catalogue = self.connection.catalogue();
        let mut history = vec![Message::user(query)];
        let response = self
            .gateway
            .complete(ModelRequest::with_tools(&history, &catalogue))
            .await?;

        let mut output = Vec::new();
        for part in response.message.parts {
            match part {
                Part::Text { text } => output.push(text),
                Part::ToolUse(call) => {
                    let result = self
                        .connection
                        .invoke_tool(&call.name, call.input.clone())
                        .await?;
                    output.push(format!(
                        "[Calling tool {} with args {}]",
                        call.name, call.input
                    ));

                    history.push(Message::tool_output(&call.id, result.to_value()));
                    let follow_up = self.gateway.complete(ModelRequest::new(&history)).await?;
                    debug!(tool = %call.name, turns = history.len(), "tool result sent to model");

                    output.push(follow_up.message.lead_text().to_string());
                }
                Part::ToolOutput { .. } => {}
            }
        }

        Ok(output.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use crate::model::{ModelError, Role};
    use crate::testing::{CallBehaviour, FakeLauncher, ScriptedGateway, artifact_file, text, tool_use};
    use serde_json::json;

    async fn ready(tools: &[&str]) -> (tempfile::TempDir, FakeLauncher, ConnectionManager<FakeLauncher>) {
        let (dir, artifact) = artifact_file();
        let launcher = FakeLauncher::with_tools(tools);
        let mut conn = ConnectionManager::new(launcher.clone());
        conn.connect(&artifact).await.unwrap();
        (dir, launcher, conn)
    }

    #[tokio::test]
    async fn tool_call_round_trip() {
        let (_dir, launcher, conn) = ready(&["echo"]).await;
        let gateway = ScriptedGateway::new()
            .reply(vec![tool_use("toolu_1", "echo", json!({"msg": "hi"}))])
            .reply(vec![text("done")]);

        let answer = QueryOrchestrator::new(&conn, &gateway).run("test").await.unwrap();

        let log = r#"Calling tool echo with args {"msg":"hi"}"#;
        let log_at = answer.find(log).expect("tool log line");
        let done_at = answer.find("done").expect("follow-up text");
        assert!(log_at < done_at);
        assert_eq!(launcher.calls(), [("echo".to_string(), json!({"msg": "hi"}))]);
    }

    #[tokio::test]
    async fn follow_up_carries_tool_result_without_tools() {
        let (_dir, _launcher, conn) = ready(&["echo"]).await;
        let gateway = ScriptedGateway::new()
            .reply(vec![tool_use("toolu_1", "echo", json!({"msg": "hi"}))])
            .reply(vec![text("done")]);

        QueryOrchestrator::new(&conn, &gateway).run("test").await.unwrap();

        let requests = gateway.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].tools.as_deref(), Some(&["echo".to_string()][..]));
        assert_eq!(requests[0].messages, [Message::user("test")]);

        assert!(requests[1].tools.is_none());
        let follow_up = &requests[1].messages;
        assert_eq!(follow_up.len(), 2);
        assert_eq!(follow_up[1].role, Role::User);
        assert_eq!(
            follow_up[1].parts,
            [Part::ToolOutput {
                tool_use_id: "toolu_1".into(),
                content: json!([{"type": "text", "text": r#"{"msg":"hi"}"#}]),
            }]
        );
    }

    #[tokio::test]
    async fn text_only_answer_is_joined() {
        let (_dir, launcher, conn) = ready(&["echo"]).await;
        let gateway = ScriptedGateway::new().reply(vec![text("Hello"), text("there")]);

        let answer = QueryOrchestrator::new(&conn, &gateway).run("hi").await.unwrap();
        assert_eq!(answer, "Hello\nthere");
        assert!(launcher.calls().is_empty());
    }

    #[tokio::test]
    async fn multiple_tool_calls_run_in_order_on_a_growing_history() {
        let (_dir, launcher, conn) = ready(&["balance", "connect-wallet"]).await;
        let gateway = ScriptedGateway::new()
            .reply(vec![
                text("Let me check."),
                tool_use("toolu_1", "connect-wallet", json!({"address": "0xabc"})),
                tool_use("toolu_2", "balance", json!({})),
            ])
            .reply(vec![text("Connected.")])
            .reply(vec![text("Balance is 1 ETH.")]);

        let answer = QueryOrchestrator::new(&conn, &gateway)
            .run("connect 0xabc and show my balance")
            .await
            .unwrap();

        assert_eq!(
            answer,
            [
                "Let me check.",
                r#"[Calling tool connect-wallet with args {"address":"0xabc"}]"#,
                "Connected.",
                "[Calling tool balance with args {}]",
                "Balance is 1 ETH.",
            ]
            .join("\n")
        );
        let names: Vec<_> = launcher.calls().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["connect-wallet", "balance"]);

        let requests = gateway.requests();
        assert_eq!(requests[1].messages.len(), 2);
        assert_eq!(requests[2].messages.len(), 3);
    }

    #[tokio::test]
    async fn follow_up_without_leading_text_adds_an_empty_line() {
        let (_dir, _launcher, conn) = ready(&["echo"]).await;
        let gateway = ScriptedGateway::new()
            .reply(vec![tool_use("toolu_1", "echo", json!({}))])
            .reply(vec![tool_use("toolu_2", "echo", json!({})), text("late text")]);

        let answer = QueryOrchestrator::new(&conn, &gateway).run("x").await.unwrap();
        assert_eq!(answer, "[Calling tool echo with args {}]\n");
    }

    #[tokio::test]
    async fn tool_log_keeps_argument_order() {
        let (_dir, _launcher, conn) = ready(&["transfer"]).await;
        let input: serde_json::Value = serde_json::from_str(r#"{"to":"0xabc","amount":1}"#).unwrap();
        let gateway = ScriptedGateway::new()
            .reply(vec![tool_use("toolu_1", "transfer", input)])
            .reply(vec![text("sent")]);

        let answer = QueryOrchestrator::new(&conn, &gateway).run("send").await.unwrap();
        assert_eq!(
            answer,
            "[Calling tool transfer with args {\"to\":\"0xabc\",\"amount\":1}]\nsent"
        );
    }

    #[tokio::test]
    async fn tool_failure_returns_no_partial_answer() {
        let (_dir, launcher, conn) = ready(&["echo"]).await;
        launcher.set_behaviour(CallBehaviour::Fail("boom".into()));
        let gateway = ScriptedGateway::new()
            .reply(vec![text("Working on it"), tool_use("toolu_1", "echo", json!({}))]);

        let err = QueryOrchestrator::new(&conn, &gateway).run("x").await.unwrap_err();
        assert!(matches!(err, QueryError::Tool(ToolError::Execution { .. })));
        assert_eq!(gateway.requests().len(), 1);
    }

    #[tokio::test]
    async fn gateway_failure_propagates() {
        let (_dir, _launcher, conn) = ready(&["echo"]).await;
        let gateway = ScriptedGateway::new().fail(ModelError::Network("connection refused".into()));

        let err = QueryOrchestrator::new(&conn, &gateway).run("x").await.unwrap_err();
        assert!(matches!(err, QueryError::Gateway(ModelError::Network(_))));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn requires_ready_connection() {
        let conn = ConnectionManager::new(FakeLauncher::with_tools(&["echo"]));
        let gateway = ScriptedGateway::new().reply(vec![text("never")]);

        let err = QueryOrchestrator::new(&conn, &gateway).run("x").await.unwrap_err();
        assert!(matches!(err, QueryError::SessionNotReady));
        assert!(gateway.requests().is_empty());
    }
}
