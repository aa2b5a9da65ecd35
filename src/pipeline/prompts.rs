//! 提示词模板
//!
//! 模板中的 `{name}` 占位符由 fill 单遍替换。

use crate::core::state::{FeedbackHistory, FeedbackSource, Tool};

pub const PLANNER_PROMPT: &str = r#"Analyze the User Request and break it down into subtasks.
If necessary, you can use Python coding tasks.

Follow these guidelines strictly:

1. **Clearly define each subtask**:
    - Each subtask must represent an independent, fundamental step solvable by a Python function.
    - Clearly describe the input/output data required and intermediate values, without specifying exact function signatures.
2. **Abstract and general**:
    - Design subtasks broadly enough to be reused for similar requests.
    - Do not include trivial steps.

---

## Query:
{problem}

---
Respond **strictly** with a JSON array inside a ```json block. Each element must match this JSON schema:

{schema}

```json
[
    {"name": "name_of_subtask_1", "description": "A description of subtask 1."}
]
```
"#;

pub const MANAGER_PROMPT: &str = r#"You are a Tool Manager. Your goal is to decide whether tools are necessary or not, and if necessary, to reuse an existing tool or create a new one.

**Current Task**: {task}
**Candidate Tools found in Memory**:
{candidates}

**Instruction**:
1. Analyze if any of the candidates PERFECTLY matches the Current Task.
2. Consider if the input variables required by the tool are available.
3. If a match is found, return the index number (e.g., '0', '1').
4. If NONE match or strictly require modification return 'CREATE'.
5. If tool is not necessary, return 'NO TOOL'.

Answer ONLY with the index number, 'CREATE' or 'NO TOOL'."#;

pub const CREATOR_PROMPT: &str = r#"You are a generic Python function generator.
Task to solve:
{task}

Requirements:
1. Create a Python function for the task.
2. The function must be independent and self-contained.
3. Return the result as a Python code snippet with tools (function definitions) in it.
4. Include the docstring for the function.

**OUTPUT FORMAT**:
<analysis>your analysis here</analysis>
<main_func>name of the function to call</main_func>
<description>what this tool does</description>
```python
# your code
```"#;

pub const REPAIR_PROMPT: &str = r#"You are a Senior Python Data Engineer & Debugging Expert.
Your goal is to fix a broken tool based on the provided error log.

### 1. CONTEXT
**Original Task:**
{task}

**Previous Attempts & Failures:**
{history}

### 2. DIAGNOSTIC CHECKLIST
- Type mismatch: convert explicitly (e.g. `pd.to_datetime`, `astype`) before processing; wrap scalars when iteration is needed.
- Data structure and keys: check column names and indices before use.
- Scope: all imports and helpers must be defined inside the tool code.
- Logic and math: handle empty data, division by zero and NaN.

### 3. YOUR TASK
Step 1: ANALYSIS. Identify the failing line and explain the root cause, stating which assumption in the old code was wrong.
Step 2: REFACTORING. Write the corrected, defensive code with its imports.

### 4. OUTPUT FORMAT
<analysis>your diagnosis here</analysis>
<main_func>name of the function to call</main_func>
<description>what this tool does</description>
```python
# ONLY the tool code, no test code
```"#;

pub const TEST_PROMPT: &str = r#"Write a Python Unit Test for the function: `{name}`.
The unit tests should test whether the function is logically correct as intended, not only the syntax.
Function Code:
{code}

REQUIREMENTS:
1. Create minimal dummy data to verify logic.
2. Use `assert` statements or `unittest` assertions.
3. Include necessary imports.
4. The function is already defined. Just call it and assert the result.
5. You MUST run the test with: `unittest.main(argv=[''], exit=False)`
{history}
OUTPUT FORMAT:
<thought>rationale on the test case</thought>
```python
# your code
```"#;

pub const SOLVER_PROMPT: &str = r#"Task: {task}
Tools:
{tools}
Variables currently in memory: {inventory}
Current values:
{context}
Steps completed so far:
{log}

Write Python code to solve the task using the real data variables and the tools above.
Save the result to a new variable. Include necessary imports.
Respond with a single ```python block."#;

pub const SOLVER_RETRY_SUFFIX: &str = "ERROR ANALYSIS: The tool code is fixed. Focus on fixing YOUR calling arguments or logic.";

pub const ANALYST_ANSWER_PROMPT: &str = r#"You are a helpful Data Analyst Assistant.
Original Question: {problem}

We have processed the data and executed the plan. Here are the collected variables and their values:
{context}

MISSION:
1. Synthesize the information from the variables to answer the Original Question.
2. Be direct and concise.
3. If the answer is a specific number or list found in variables, provide it clearly.
4. Do NOT show python code or internal variable names in the final answer."#;

pub const MATH_ANSWER_PROMPT: &str = r#"You are a math expert. Your task is to answer the following question with your reasoning.
The answer has to be in one of following formats: integer, float, complex number, (numeric) string, (LaTeX expression) string.
You must put your answer in $\boxed{}$

Think step by step.
---
## Problem:
{problem}

## Here are some variables collected from intermediate steps. You can use these variables for your reasoning.
{context}

## Reasoning:
<Your step-by-step explanation>

## Answer:
<Your answer>"#;

/// 单遍替换 `{key}` 占位符；已替换进去的内容不会被再次扫描
pub fn fill(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let hit = vars.iter().find_map(|(k, v)| {
            after
                .strip_prefix(k)
                .and_then(|r| r.strip_prefix('}'))
                .map(|r| (v, r))
        });
        match hit {
            Some((value, remaining)) => {
                out.push_str(value);
                rest = remaining;
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// 失败历史渲染为提示词片段，最近的在前
pub fn render_feedback(history: &FeedbackHistory) -> String {
    let mut out = String::new();
    let entries: Vec<_> = history.iter().collect();
    for item in entries.into_iter().rev() {
        let label = match item.source {
            FeedbackSource::Tester => "Test Code",
            FeedbackSource::Solver => "Execution Code",
        };
        out.push_str(&format!(
            "=== FAILED ATTEMPT (Source: {}) ===\n[Tool Code Used]:\n{}\n\n[{}]:\n{}\n\n[Error Log]:\n{}\n",
            item.source.to_string().to_uppercase(),
            item.tool_code,
            label,
            item.attempted_code,
            item.error_text
        ));
        out.push_str("==========================================\n");
    }
    out
}

/// 工具列表渲染为 `- name: docstring`
pub fn render_tool_list(tools: &[Tool]) -> String {
    if tools.is_empty() {
        return "(no tool needed; use plain Python)".to_string();
    }
    tools
        .iter()
        .map(|t| format!("- {}: {}", t.name, t.docstring))
        .collect::<Vec<_>>()
        .join("\n")
}
