//! 变量检查：读取 main 上下文的全局变量
//!
//! - 变量清单：非下划线开头的全局变量 -> 类型名
//! - 最终上下文：标量与短值归为 answers，大结构归为 evidence（只含类型、形状与少量预览）

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 变量清单探针；输出一行 JSON
pub const INVENTORY_PROBE: &str = r#"
import json as _toolsmith_json
print(_toolsmith_json.dumps({_k: type(_v).__name__ for _k, _v in list(globals().items()) if not _k.startswith('_')}))
"#;

/// 最终上下文探针；输出一行 JSON {"answers": {...}, "evidence": {...}}
pub const FINAL_CONTEXT_PROBE: &str = r#"
def _toolsmith_final_context():
    import json, types
    answers, evidence = {}, {}
    for k, v in list(globals().items()):
        if k.startswith('_') or isinstance(v, (types.ModuleType, types.FunctionType, types.BuiltinFunctionType, type)):
            continue
        tname = type(v).__name__
        try:
            is_np_scalar = type(v).__module__ == 'numpy' and getattr(v, 'ndim', None) == 0
            if isinstance(v, (int, float)) or is_np_scalar:
                answers[k] = repr(v.item() if is_np_scalar else v)
            elif isinstance(v, str) and len(v) < 200:
                answers[k] = v
            elif isinstance(v, (list, tuple)) and len(v) < 10:
                answers[k] = repr(v)
            elif hasattr(v, 'head') and hasattr(v, 'shape'):
                evidence[k] = {"type": tname, "shape": str(v.shape), "preview": v.head(3).to_string()}
            else:
                evidence[k] = {"type": tname}
        except Exception:
            evidence[k] = {"type": tname}
    print(json.dumps({"answers": answers, "evidence": evidence}))
_toolsmith_final_context()
"#;

/// evidence 条目：只描述结构，不含完整内容
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceItem {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

/// 最终上下文快照
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalContext {
    #[serde(default)]
    pub answers: BTreeMap<String, String>,
    #[serde(default)]
    pub evidence: BTreeMap<String, EvidenceItem>,
}

impl FinalContext {
    pub fn is_empty(&self) -> bool {
        self.answers.is_empty() && self.evidence.is_empty()
    }

    /// 渲染为提示词片段
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("Candidate answers:\n");
        if self.answers.is_empty() {
            out.push_str("  (none)\n");
        }
        for (k, v) in &self.answers {
            out.push_str(&format!("  {} = {}\n", k, v));
        }
        out.push_str("Evidence:\n");
        if self.evidence.is_empty() {
            out.push_str("  (none)\n");
        }
        for (k, e) in &self.evidence {
            out.push_str(&format!("  {} ({})", k, e.type_name));
            if let Some(ref shape) = e.shape {
                out.push_str(&format!(" shape={}", shape));
            }
            out.push('\n');
            if let Some(ref p) = e.preview {
                for line in p.lines() {
                    out.push_str(&format!("    {}\n", line));
                }
            }
        }
        out
    }
}

/// 取最后一个非空行解析为 JSON
fn last_json_line<T: for<'de> Deserialize<'de>>(stdout: &str) -> Result<T, String> {
    let line = stdout
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| "probe produced no output".to_string())?;
    serde_json::from_str(line.trim()).map_err(|e| e.to_string())
}

pub fn parse_inventory(stdout: &str) -> Result<BTreeMap<String, String>, String> {
    last_json_line(stdout)
}

pub fn parse_final_context(stdout: &str) -> Result<FinalContext, String> {
    last_json_line(stdout)
}
