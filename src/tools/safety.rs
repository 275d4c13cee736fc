//! SafetyGate：危险动作识别与人工确认
//!
//! 只有配置中的动作（默认 click）参与判断：把全部参数值拼接后小写，按关键词顺序做子串匹配，
//! 第一个命中的关键词作为原因。这是粗粒度、可解释、宁可误报的启发式，不是语义分类器。
//! 确认必须得到明确的是/否，没有超时或默认放行。

use std::collections::HashSet;

use serde_json::Value;

use crate::config::SafetySection;
use crate::core::AgentError;
use crate::human::HumanPort;

/// classify 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub dangerous: bool,
    pub reason: String,
}

impl Verdict {
    fn safe() -> Self {
        Self {
            dangerous: false,
            reason: String::new(),
        }
    }
}

/// 危险动作闸门：受检动作名集合 + 有序关键词表
#[derive(Debug, Clone)]
pub struct SafetyGate {
    guarded_actions: HashSet<String>,
    keywords: Vec<String>,
}

impl Default for SafetyGate {
    fn default() -> Self {
        Self::from_config(&SafetySection::default())
    }
}

impl SafetyGate {
    pub fn new(guarded_actions: Vec<String>, keywords: Vec<String>) -> Self {
        Self {
            guarded_actions: guarded_actions.into_iter().collect(),
            keywords: keywords
                .into_iter()
                .map(|k| k.to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn from_config(cfg: &SafetySection) -> Self {
        Self::new(cfg.guarded_actions.clone(), cfg.keywords.clone())
    }

    /// 判断动作是否危险；不受检的动作永远安全
    pub fn classify<'a>(
        &self,
        action_name: &str,
        args: impl IntoIterator<Item = (&'a String, &'a Value)>,
    ) -> Verdict {
        if !self.guarded_actions.contains(action_name) {
            return Verdict::safe();
        }

        let haystack = args
            .into_iter()
            .map(|(_, v)| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        match self.keywords.iter().find(|k| haystack.contains(k.as_str())) {
            Some(keyword) => Verdict {
                dangerous: true,
                reason: format!("action contains '{}'", keyword),
            },
            None => Verdict::safe(),
        }
    }

    /// 阻塞等待人工明确答复；true 表示放行
    pub async fn confirm(
        &self,
        human: &dyn HumanPort,
        action_name: &str,
        args_preview: &str,
        reason: &str,
    ) -> Result<bool, AgentError> {
        let prompt = format!(
            "WARNING: {}\nAction: {} with arguments {}\nProceed?",
            reason, action_name, args_preview
        );
        let approved = human.confirm(&prompt).await?;
        if approved {
            tracing::info!(action = %action_name, reason = %reason, "dangerous action approved");
        } else {
            tracing::warn!(action = %action_name, reason = %reason, "dangerous action declined");
        }
        Ok(approved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::human::ScriptedHuman;
    use serde_json::{json, Map};

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_case_insensitive_substring() {
        let gate = SafetyGate::default();
        let v = gate.classify("click", &args(json!({"selector": "#BUY-now"})));
        assert!(v.dangerous);
        assert!(v.reason.contains("buy"));
    }

    #[test]
    fn test_cyrillic_keywords_flagged() {
        let gate = SafetyGate::default();
        let v = gate.classify(
            "click",
            &args(json!({"selector": "button:has-text(\"Удалить аккаунт\")"})),
        );
        assert!(v.dangerous);
        assert_eq!(v.reason, "action contains 'удалить'");

        let v = gate.classify("click", &args(json!({"selector": "#checkout", "label": "КУПИТЬ"})));
        assert!(v.dangerous);
    }

    #[test]
    fn test_no_keyword_is_safe() {
        let gate = SafetyGate::default();
        let v = gate.classify("click", &args(json!({"selector": "#continue"})));
        assert!(!v.dangerous);
        assert!(v.reason.is_empty());
    }

    #[test]
    fn test_unguarded_action_never_flagged() {
        let gate = SafetyGate::default();
        let v = gate.classify("fill", &args(json!({"selector": "#x", "text": "delete everything"})));
        assert!(!v.dangerous);
    }

    #[test]
    fn test_first_keyword_in_list_order_wins() {
        let gate = SafetyGate::new(vec!["click".into()], vec!["pay".into(), "confirm".into()]);
        let v = gate.classify("click", &args(json!({"selector": "button:has-text(\"Confirm and Pay\")"})));
        assert_eq!(v.reason, "action contains 'pay'");
    }

    #[test]
    fn test_delete_account_flagged() {
        let gate = SafetyGate::default();
        assert!(gate.classify("click", &args(json!({"selector": "#delete-account"}))).dangerous);
    }

    #[tokio::test]
    async fn test_confirm_uses_human_answer() {
        let gate = SafetyGate::default();
        let human = ScriptedHuman::new().confirm_with(false);
        let ok = gate
            .confirm(&human, "click", "{\"selector\":\"#delete\"}", "action contains 'delete'")
            .await
            .unwrap();
        assert!(!ok);
        assert_eq!(human.prompts().len(), 1);
        let prompt = &human.prompts()[0];
        assert!(prompt.contains("action contains 'delete'"));
        assert!(prompt.contains("click"));
        assert!(prompt.contains("#delete"));
    }
}
