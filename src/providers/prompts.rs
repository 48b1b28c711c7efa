use serde_json::{Map, Value};

use crate::types::ToolInfo;

/// Prompt asking the model to map each tool's parameters to likely source
/// tools. The reply must be a raw JSON array.
pub fn analyze_dependencies(tools: &[ToolInfo]) -> String {
    format!(
        "You are analyzing the tools exposed by an MCP server to determine their data \
dependencies.\n\n\
Tools:\n{}\n\
For each tool determine:\n\
1. Which parameters are required.\n\
2. Whether it can execute without any prior context (no required parameters).\n\
3. A suggested execution order (1 = first).\n\
4. Which parameters likely come from another tool's output, with a confidence between 0 and 1.\n\n\
Respond with raw JSON only, no markdown and no code fences. Format:\n\
[\n\
  {{\"tool\": \"toolName\", \"requiredParams\": [\"param\"], \"canExecuteWithoutContext\": true, \
\"suggestedOrder\": 1, \"dependencies\": [{{\"paramName\": \"param\", \"sourceTool\": \"otherTool\", \
\"sourceField\": \"fieldPath\", \"confidence\": 0.8}}]}}\n\
]",
        describe_tools(tools)
    )
}

/// Prompt asking the model to fill one tool's parameters from the context
/// of previously executed tools.
pub fn extract_parameters(tool: &ToolInfo, context: &Map<String, Value>) -> String {
    let schema = serde_json::to_string_pretty(&tool.input_schema).unwrap_or_default();
    let context_json =
        serde_json::to_string_pretty(&Value::Object(context.clone())).unwrap_or_default();
    let required = if tool.input_schema.required.is_empty() {
        "(none)".to_string()
    } else {
        tool.input_schema.required.join(", ")
    };

    format!(
        "Extract parameters for the tool \"{}\" from the results of previously executed tools.\n\n\
Tool description: {}\n\
Parameter schema:\n{}\n\
Required parameters: {}\n\n\
Available context (tool name to flattened result):\n{}\n\n\
Rules:\n\
- Only use values that are actually present in the context.\n\
- For every parameter you fill, record where it came from as \"toolName.fieldPath\".\n\
- List required parameters you could not fill in missingParams.\n\
- confidence is your overall confidence in the mapping, between 0 and 1.\n\n\
Respond with raw JSON only, no markdown and no code fences. Format:\n\
{{\"params\": {{}}, \"sources\": {{\"param\": \"toolName.fieldPath\"}}, \"confidence\": 0.0, \
\"missingParams\": []}}",
        tool.name,
        tool.description.as_deref().unwrap_or("(none)"),
        schema,
        required,
        context_json
    )
}

/// Prompt asking the model to pick the next tool from the unexecuted set,
/// or null when nothing useful remains.
pub fn select_next_tool(
    tools: &[ToolInfo],
    executed: &[String],
    context: &Map<String, Value>,
    current_depth: u32,
    max_depth: u32,
) -> String {
    let unexecuted: Vec<&ToolInfo> = tools
        .iter()
        .filter(|t| !executed.contains(&t.name))
        .collect();
    let unexecuted_desc = describe_tools_ref(&unexecuted);
    let executed_desc = if executed.is_empty() {
        "(none)".to_string()
    } else {
        executed.join(", ")
    };
    let context_json =
        serde_json::to_string_pretty(&Value::Object(context.clone())).unwrap_or_default();

    format!(
        "Select the next tool to execute, or null when no useful call remains.\n\n\
Available tools (not yet executed):\n{}\n\
Already executed, do NOT select these again: {}\n\n\
Available context (tool name to flattened result):\n{}\n\n\
Current depth: {} of {}. Prefer shallow dependency chains.\n\n\
Selection priority:\n\
1. Tools with no required parameters.\n\
2. Search and list tools that discover identifiers.\n\
3. Get and read tools whose required parameters can be satisfied from the context.\n\
4. Mutating tools last, and only when every required parameter is satisfied.\n\n\
Respond with raw JSON only, no markdown and no code fences. Format:\n\
{{\"tool\": \"toolName\" or null, \"reason\": \"why this tool (or why none)\"}}",
        unexecuted_desc, executed_desc, context_json, current_depth, max_depth
    )
}

fn describe_tools(tools: &[ToolInfo]) -> String {
    let refs: Vec<&ToolInfo> = tools.iter().collect();
    describe_tools_ref(&refs)
}

fn describe_tools_ref(tools: &[&ToolInfo]) -> String {
    if tools.is_empty() {
        return "(none)\n".to_string();
    }
    let mut out = String::new();
    for tool in tools {
        out.push_str(&format!(
            "- {}: {}\n",
            tool.name,
            tool.description.as_deref().unwrap_or("(no description)")
        ));
        for (name, prop) in &tool.input_schema.properties {
            let required = if tool.input_schema.required.contains(name) {
                ", required"
            } else {
                ""
            };
            out.push_str(&format!(
                "    {} ({}{}): {}\n",
                name,
                prop.param_type,
                required,
                prop.description.as_deref().unwrap_or("")
            ));
        }
    }
    out
}
