//! Natural-language-to-SQL agent.
//!
//! The model is given three tools over the database and asked to answer the
//! prompt. Each turn either calls tools (their output is fed back) or replies
//! with text, which ends the run.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::AgentConfig;
use crate::database::SqlDatabase;
use crate::error::Result;
use crate::llm::{ChatMessage, ChatModel, ToolCall, ToolSpec};

pub const LIST_TABLES: &str = "sql_db_list_tables";
pub const SCHEMA: &str = "sql_db_schema";
pub const QUERY: &str = "sql_db_query";

pub const ITERATION_LIMIT_REPLY: &str = "Agent stopped due to iteration limit or time limit.";

/// Answers a fully rendered prompt.
#[async_trait]
pub trait QueryAgent: Send + Sync {
    async fn ask(&self, prompt: &str) -> Result<String>;
}

pub struct SqlAgent {
    model: Arc<dyn ChatModel>,
    database: Arc<dyn SqlDatabase>,
    config: AgentConfig,
    tools: Vec<ToolSpec>,
}

#[derive(Deserialize)]
struct SchemaArgs {
    table_names: String,
}

#[derive(Deserialize)]
struct QueryArgs {
    query: String,
}

impl SqlAgent {
    pub fn new(
        model: Arc<dyn ChatModel>,
        database: Arc<dyn SqlDatabase>,
        config: AgentConfig,
    ) -> Self {
        Self {
            model,
            database,
            config,
            tools: tool_specs(),
        }
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are an agent designed to interact with a SQL database.\n\
             Given an input question, create a syntactically correct {dialect} query to run, then look at the results of the query and return the answer.\n\
             Unless the user specifies a specific number of examples they wish to obtain, always limit your query to at most {top_k} results.\n\
             You can order the results by a relevant column to return the most interesting examples in the database.\n\
             Never query for all the columns from a specific table, only ask for the relevant columns given the question.\n\
             Only use the information returned by the tools to construct your final answer.\n\
             If you get an error while executing a query, rewrite the query and try again.\n\
             DO NOT make any DML statements (INSERT, UPDATE, DELETE, DROP etc.) to the database.\n\
             Always start by calling {list} to see what you can query, then call {schema} for the relevant tables.",
            dialect = self.database.dialect(),
            top_k = self.config.top_k,
            list = LIST_TABLES,
            schema = SCHEMA,
        )
    }

    /// Runs one tool call. Failures are reported back to the model as text
    /// so it can correct itself.
    async fn run_tool(&self, call: &ToolCall) -> String {
        let outcome = match call.function.name.as_str() {
            LIST_TABLES => self.database.table_names().await.map(|names| names.join(", ")),
            SCHEMA => match serde_json::from_str::<SchemaArgs>(&call.function.arguments) {
                Ok(args) => {
                    let tables: Vec<String> = args
                        .table_names
                        .split(',')
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .collect();
                    self.database.table_info(&tables).await
                }
                Err(e) => return format!("Error: invalid arguments for {}: {}", SCHEMA, e),
            },
            QUERY => match serde_json::from_str::<QueryArgs>(&call.function.arguments) {
                Ok(args) => {
                    tracing::debug!(query = %args.query, "agent query");
                    self.database.run(&args.query).await.map(|rows| {
                        if rows.is_empty() {
                            "[]".to_string()
                        } else {
                            rows.join("\n")
                        }
                    })
                }
                Err(e) => return format!("Error: invalid arguments for {}: {}", QUERY, e),
            },
            other => {
                return format!(
                    "Error: {} is not a valid tool, try one of [{}, {}, {}].",
                    other, LIST_TABLES, SCHEMA, QUERY
                );
            }
        };

        outcome.unwrap_or_else(|e| format!("Error: {}", e))
    }
}

#[async_trait]
impl QueryAgent for SqlAgent {
    async fn ask(&self, prompt: &str) -> Result<String> {
        let mut messages = vec![
            ChatMessage::system(self.system_prompt()),
            ChatMessage::user(prompt),
        ];

        for iteration in 0..self.config.max_iterations {
            let reply = self.model.complete(&messages, &self.tools).await?;

            if reply.tool_calls.is_empty() {
                tracing::info!(iterations = iteration + 1, "agent finished");
                return Ok(reply.content.unwrap_or_default());
            }

            let calls = reply.tool_calls.clone();
            messages.push(reply);
            for call in &calls {
                tracing::debug!(tool = %call.function.name, "agent tool call");
                let output = self.run_tool(call).await;
                messages.push(ChatMessage::tool_result(call.id.clone(), output));
            }
        }

        tracing::warn!(max_iterations = self.config.max_iterations, "agent hit iteration limit");
        Ok(ITERATION_LIMIT_REPLY.to_string())
    }
}

fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec::function(
            LIST_TABLES,
            "Input is an empty string, output is a comma-separated list of tables in the database.",
            json!({"type": "object", "properties": {}, "required": []}),
        ),
        ToolSpec::function(
            SCHEMA,
            "Input to this tool is a comma-separated list of tables, output is the schema and sample rows for those tables. Be sure that the tables actually exist by calling sql_db_list_tables first!",
            json!({
                "type": "object",
                "properties": {
                    "table_names": {"type": "string", "description": "Comma-separated table names, e.g. 'table1, table2'"}
                },
                "required": ["table_names"]
            }),
        ),
        ToolSpec::function(
            QUERY,
            "Input to this tool is a detailed and correct SQL query, output is a result from the database. If the query is not correct, an error message will be returned. If an error is returned, rewrite the query, check the query, and try again.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "A detailed and correct SQL query."}
                },
                "required": ["query"]
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::llm::{FunctionCall, Role};
    use std::sync::Mutex;

    struct ScriptedModel {
        replies: Mutex<Vec<ChatMessage>>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedModel {
        fn new(mut replies: Vec<ChatMessage>) -> Self {
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            tools: &[ToolSpec],
        ) -> Result<ChatMessage> {
            assert_eq!(tools.len(), 3);
            self.seen.lock().unwrap().push(messages.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| AppError::LlmError("script exhausted".to_string()))
        }
    }

    struct FakeDb;

    #[async_trait]
    impl SqlDatabase for FakeDb {
        fn dialect(&self) -> &'static str {
            "postgresql"
        }

        async fn table_names(&self) -> Result<Vec<String>> {
            Ok(vec!["coldsnaps".to_string(), "heatwaves".to_string()])
        }

        async fn table_info(&self, tables: &[String]) -> Result<String> {
            Ok(format!("CREATE TABLE {}", tables.join(", ")))
        }

        async fn run(&self, query: &str) -> Result<Vec<String>> {
            if query.contains("nope") {
                return Err(AppError::DatabaseError("relation \"nope\" does not exist".to_string()));
            }
            Ok(vec![r#"{"start_date":"2011-08-01","temperature":109.4,"NERC_ID":"3"}"#.to_string()])
        }
    }

    fn call(id: &str, name: &str, arguments: &str) -> ChatMessage {
        ChatMessage {
            role: Role::Assistant,
            content: None,
            tool_calls: vec![ToolCall {
                id: id.to_string(),
                kind: "function".to_string(),
                function: FunctionCall {
                    name: name.to_string(),
                    arguments: arguments.to_string(),
                },
            }],
            tool_call_id: None,
        }
    }

    fn agent(model: Arc<ScriptedModel>, max_iterations: usize) -> SqlAgent {
        SqlAgent::new(
            model,
            Arc::new(FakeDb),
            AgentConfig {
                max_iterations,
                ..AgentConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn tool_results_are_fed_back_until_a_text_reply() {
        let model = Arc::new(ScriptedModel::new(vec![
            call("c1", LIST_TABLES, "{}"),
            call("c2", SCHEMA, r#"{"table_names": "heatwaves"}"#),
            call("c3", QUERY, r#"{"query": "SELECT start_date, temperature, \"NERC_ID\" FROM heatwaves"}"#),
            ChatMessage::assistant("The worst ERCOT heat wave began 2011-08-01."),
        ]));

        let answer = agent(model.clone(), 15).ask("worst heat wave in ERCOT?").await.unwrap();
        assert_eq!(answer, "The worst ERCOT heat wave began 2011-08-01.");

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert!(seen[0][0].content.as_deref().unwrap().contains("at most 600 results"));
        assert_eq!(seen[0][1].content.as_deref(), Some("worst heat wave in ERCOT?"));

        let last = &seen[3];
        let tool_outputs: Vec<&str> = last
            .iter()
            .filter(|m| m.role == Role::Tool)
            .filter_map(|m| m.content.as_deref())
            .collect();
        assert_eq!(
            tool_outputs,
            vec![
                "coldsnaps, heatwaves",
                "CREATE TABLE heatwaves",
                r#"{"start_date":"2011-08-01","temperature":109.4,"NERC_ID":"3"}"#,
            ]
        );
        assert_eq!(last[2].tool_calls[0].id, "c1");
        assert_eq!(last[3].tool_call_id.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn query_errors_are_returned_to_the_model() {
        let model = Arc::new(ScriptedModel::new(vec![
            call("c1", QUERY, r#"{"query": "SELECT * FROM nope"}"#),
            ChatMessage::assistant("done"),
        ]));

        agent(model.clone(), 15).ask("q").await.unwrap();

        let seen = model.seen.lock().unwrap();
        let tool = seen[1].last().unwrap();
        assert_eq!(tool.role, Role::Tool);
        assert!(tool.content.as_deref().unwrap().starts_with("Error: Database error: relation"));
    }

    #[tokio::test]
    async fn unknown_tools_and_bad_arguments_are_explained() {
        let model = Arc::new(ScriptedModel::new(vec![
            call("c1", "sql_db_drop", "{}"),
            call("c2", SCHEMA, "not json"),
            ChatMessage::assistant("ok"),
        ]));

        agent(model.clone(), 15).ask("q").await.unwrap();

        let seen = model.seen.lock().unwrap();
        let reply = |turn: usize| seen[turn].last().unwrap().content.clone().unwrap();
        assert!(reply(1).contains("is not a valid tool"));
        assert!(reply(2).contains("invalid arguments for sql_db_schema"));
    }

    #[tokio::test]
    async fn iteration_limit_stops_the_loop() {
        let model = Arc::new(ScriptedModel::new(vec![
            call("c1", LIST_TABLES, "{}"),
            call("c2", LIST_TABLES, "{}"),
            call("c3", LIST_TABLES, "{}"),
        ]));

        let answer = agent(model.clone(), 2).ask("q").await.unwrap();

        assert_eq!(answer, ITERATION_LIMIT_REPLY);
        assert_eq!(model.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn model_failures_propagate() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let err = agent(model, 15).ask("q").await.unwrap_err();
        assert!(matches!(err, AppError::LlmError(_)));
    }
}
