use serde_json::Value;

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Prompt asking for a whole-project panorama used as context for later explanations
pub fn project_overview_prompt(structure: &Value, dependencies: &Value) -> String {
    format!(
        r#"Generate a comprehensive overview and panorama of the target project.
Include all file and function names and dependency relationships.

File structure: {structure}
Dependencies: {dependencies}

Response format:
# Project Overview

## File Structure
[List all files and their purposes]

## Key Functions
[List key functions and their roles]

## Dependency Relationships
[Describe how modules/files depend on each other]
"#,
        structure = pretty(structure),
        dependencies = pretty(dependencies),
    )
}

/// Prompt asking for a newcomer-oriented explanation of one traced function
pub fn explain_function_prompt(
    code: &str,
    function_name: &str,
    project_overview: &str,
    trace_context: &str,
) -> String {
    format!(
        r#"You are helping a newcomer understand a complex project during debugging.
Use the following project overview for context:

{project_overview}

Trace context:
{trace_context}

Function to explain:
Name: {function_name}
Code:
```
{code}
```

Please provide:
1. Purpose: Explain the function's role in the overall project context
2. Inputs: Describe what parameters it takes and what they represent
3. Outputs: Describe what it returns and what it represents
4. Process: Briefly explain key steps in the function's logic
"#
    )
}

/// Call order rendered as `a -> b -> c`
pub fn trace_context(functions: &[String]) -> String {
    functions.join(" -> ")
}
