use crate::error::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Descriptor for tool function parameters
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolDescriptor {
    pub r#type: String,
    pub function: FunctionDescriptor,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FunctionDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Trait for LLM tools
#[async_trait]
pub trait LlmTool: Send + Sync {
    /// Execute the tool with already parsed arguments.
    ///
    /// The returned text is inserted into the conversation as a tool result.
    async fn run(&self, args: &Map<String, Value>) -> Result<String>;

    /// Get tool descriptor for LLM
    fn descriptor(&self) -> ToolDescriptor;

    /// Check if this tool matches the given name
    fn matches(&self, name: &str) -> bool {
        self.descriptor().function.name == name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_descriptor_serialization() {
        let descriptor = ToolDescriptor {
            r#type: "function".to_string(),
            function: FunctionDescriptor {
                name: "test_tool".to_string(),
                description: "A test tool".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "arg1": {"type": "string"}
                    }
                }),
            },
        };

        let value = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(value["type"], "function");
        assert_eq!(value["function"]["name"], "test_tool");
        assert_eq!(value["function"]["description"], "A test tool");
    }

    struct MockTool;

    #[async_trait]
    impl LlmTool for MockTool {
        async fn run(&self, _args: &Map<String, Value>) -> Result<String> {
            Ok("result".to_string())
        }

        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor {
                r#type: "function".to_string(),
                function: FunctionDescriptor {
                    name: "mock_tool".to_string(),
                    description: "A mock tool".to_string(),
                    parameters: json!({}),
                },
            }
        }
    }

    #[test]
    fn test_tool_matches() {
        let tool = MockTool;
        assert!(tool.matches("mock_tool"));
        assert!(!tool.matches("other_tool"));
    }

    #[tokio::test]
    async fn test_tool_run() {
        let tool = MockTool;
        let result = tool.run(&Map::new()).await.unwrap();
        assert_eq!(result, "result");
    }
}
