//! Bundled detection engine.
//!
//! A ruleset is an ordered list of regex rules. Each rule may name the capture
//! group that holds the actual secret, require a minimum Shannon entropy of
//! that secret, gate itself behind cheap keyword checks and drop known false
//! positives through an allowlist. Custom rulesets use the same TOML layout
//! as gitleaks (`[[rules]]`, `secretGroup`, `[extend] useDefault`).
//!
//! Default rules are prefix- or structure-based and taken from Gitleaks and
//! secrets-patterns-db, plus the generic keyword-assignment rule.

use aho_corasick::AhoCorasick;
use std::collections::HashMap;
use std::path::Path;

use regex::{Captures, Regex};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::scanner::{Detector, Finding};

struct RuleDef {
    id: &'static str,
    description: &'static str,
    regex: &'static str,
    secret_group: usize,
    entropy: Option<f64>,
    keywords: &'static [&'static str],
}

const fn rule(id: &'static str, description: &'static str, regex: &'static str) -> RuleDef {
    RuleDef {
        id,
        description,
        regex,
        secret_group: 0,
        entropy: None,
        keywords: &[],
    }
}

static DEFAULT_RULES: &[RuleDef] = &[
    // ─── Cloud providers ──────────────────────────────────────────────────────
    rule(
        "aws-access-token",
        "AWS access key ID",
        r"\b(?:A3T[A-Z0-9]|AKIA|ASIA|ABIA|ACCA)[A-Z2-7]{16}\b",
    ),
    rule("gcp-api-key", "GCP API key", r"\bAIza[\w-]{35}\b"),
    rule(
        "digitalocean-pat",
        "DigitalOcean personal access token",
        r"\bdop_v1_[a-f0-9]{64}\b",
    ),
    rule(
        "alibaba-access-key-id",
        "Alibaba Cloud access key ID",
        r"\bLTAI[a-zA-Z0-9]{17,21}\b",
    ),
    // ─── AI platforms ─────────────────────────────────────────────────────────
    rule(
        "anthropic-api-key",
        "Anthropic API key",
        r"\bsk-ant-api03-[a-zA-Z0-9_-]{93}AA\b",
    ),
    rule(
        "anthropic-admin-api-key",
        "Anthropic admin API key",
        r"\bsk-ant-admin01-[a-zA-Z0-9_-]{93}AA\b",
    ),
    rule(
        "openai-api-key",
        "OpenAI API key",
        r"\bsk-(?:(?:proj|svcacct|admin)-[A-Za-z0-9_-]{58,74}|[a-zA-Z0-9]{20})T3BlbkFJ[A-Za-z0-9_-]{20,74}\b",
    ),
    rule(
        "huggingface-access-token",
        "HuggingFace access token",
        r"\bhf_[a-zA-Z]{34}\b",
    ),
    rule(
        "perplexity-api-key",
        "Perplexity API key",
        r"\bpplx-[a-zA-Z0-9]{48}\b",
    ),
    // ─── Version control ──────────────────────────────────────────────────────
    rule(
        "github-pat",
        "GitHub personal access token",
        r"\bghp_[0-9a-zA-Z]{36}\b",
    ),
    rule(
        "github-fine-grained-pat",
        "GitHub fine-grained personal access token",
        r"\bgithub_pat_\w{82}\b",
    ),
    rule("github-oauth", "GitHub OAuth token", r"\bgho_[0-9a-zA-Z]{36}\b"),
    rule(
        "github-app-token",
        "GitHub app token",
        r"\b(?:ghu|ghs)_[0-9a-zA-Z]{36}\b",
    ),
    rule(
        "github-refresh-token",
        "GitHub refresh token",
        r"\bghr_[0-9a-zA-Z]{36}\b",
    ),
    rule(
        "gitlab-pat",
        "GitLab personal access token",
        r"\bglpat-[\w-]{20}\b",
    ),
    // ─── Communication ────────────────────────────────────────────────────────
    rule(
        "slack-bot-token",
        "Slack bot token",
        r"\bxoxb-[0-9]{8,14}-[0-9]{8,14}-[a-zA-Z0-9]{24}\b",
    ),
    rule(
        "slack-user-token",
        "Slack user token",
        r"\bxox[pe](?:-[0-9]{10,13}){3}-[a-zA-Z0-9-]{28,34}\b",
    ),
    rule(
        "slack-webhook-url",
        "Slack incoming webhook",
        r"(?:https?://)?hooks\.slack\.com/(?:services|workflows|triggers)/[A-Za-z0-9+/]{43,56}",
    ),
    rule(
        "discord-webhook-url",
        "Discord webhook",
        r"https://discord(?:app)?\.com/api/webhooks/[0-9]{17,20}/[A-Za-z0-9_-]{60,72}",
    ),
    // ─── Payment ──────────────────────────────────────────────────────────────
    rule(
        "stripe-access-token",
        "Stripe secret or restricted key",
        r"\b(?:sk|rk)_(?:test|live|prod)_[a-zA-Z0-9]{10,99}\b",
    ),
    rule(
        "shopify-access-token",
        "Shopify access token",
        r"\bshp(?:at|ca|pa|ss)_[a-fA-F0-9]{32}\b",
    ),
    // ─── Developer tools ──────────────────────────────────────────────────────
    rule(
        "sendgrid-api-token",
        "SendGrid API token",
        r"\bSG\.[a-zA-Z0-9=_-]{22}\.[a-zA-Z0-9=_-]{43}\b",
    ),
    rule("npm-access-token", "npm access token", r"\bnpm_[a-zA-Z0-9]{36}\b"),
    rule(
        "pypi-upload-token",
        "PyPI upload token",
        r"\bpypi-AgEIcHlwaS5vcmc[\w-]{50,200}\b",
    ),
    rule(
        "databricks-api-token",
        "Databricks API token",
        r"\bdapi[a-f0-9]{32}(?:-[0-9])?\b",
    ),
    rule(
        "grafana-cloud-api-token",
        "Grafana Cloud API token",
        r"\bglc_[A-Za-z0-9+/]{32,400}={0,3}",
    ),
    rule(
        "vault-service-token",
        "HashiCorp Vault service token",
        r"\bhvs\.[\w-]{90,120}\b",
    ),
    rule(
        "linear-api-key",
        "Linear API key",
        r"\blin_api_[a-zA-Z0-9]{40}\b",
    ),
    // ─── Structural ───────────────────────────────────────────────────────────
    rule(
        "private-key",
        "PEM private key block",
        r"(?s)-----BEGIN[ A-Z0-9_-]{0,100}PRIVATE KEY(?: BLOCK)?-----.{64,}?-----END[ A-Z0-9_-]{0,100}PRIVATE KEY(?: BLOCK)?-----",
    ),
    rule(
        "jwt",
        "JSON web token",
        r"\bey[A-Za-z0-9_-]{17,}\.ey[A-Za-z0-9_-]{17,}\.[A-Za-z0-9_-]{10,}={0,2}",
    ),
    RuleDef {
        secret_group: 1,
        ..rule(
            "database-connection-password",
            "Password embedded in a database connection string",
            r"(?:postgres(?:ql)?|mysql2?|mongodb(?:\+srv)?|amqps?)://[^@\s:/]+:([^@\s/]+)@[^\s/]+",
        )
    },
    RuleDef {
        secret_group: 1,
        ..rule(
            "redis-connection-password",
            "Password embedded in a redis connection string",
            r"rediss?://[^@\s:/]*:([^@\s/]{3,})@[^\s/]+",
        )
    },
    // ─── Generic ──────────────────────────────────────────────────────────────
    RuleDef {
        secret_group: 1,
        entropy: Some(3.5),
        keywords: &[
            "access", "api", "auth", "key", "credential", "creds", "passwd", "password",
            "secret", "token",
        ],
        ..rule(
            "generic-api-key",
            "Generic credential assignment",
            r#"(?i)(?:access|auth|(?-i:[Aa]pi|API)|credential|creds|key|passw(?:or)?d|secret|token)(?:[ \t\w.-]{0,20})[\s'"]{0,3}(?:=|>|:{1,3}=|\|\||:|=>|\?=|,)[\x60'"\s=]{0,5}([\w.=-]{10,150})(?:[\x60'"\s;]|\\[nr]|$)"#,
        )
    },
];

/// Values the generic rule must never report.
static DEFAULT_STOPWORDS: &[&str] = &["example", "placeholder", "changeme", "redacted"];

#[derive(Debug, Default)]
struct Allowlist {
    regexes: Vec<Regex>,
    stopwords: Vec<String>,
}

impl Allowlist {
    fn compile(raw: AllowlistSpec, owner: &str) -> Result<Self> {
        let regexes = raw
            .regexes
            .iter()
            .map(|r| compile_regex(owner, r))
            .collect::<Result<Vec<_>>>()?;
        let stopwords = raw.stopwords.iter().map(|s| s.to_lowercase()).collect();
        Ok(Allowlist { regexes, stopwords })
    }

    fn allows(&self, secret: &str) -> bool {
        if self.regexes.iter().any(|r| r.is_match(secret)) {
            return true;
        }
        if self.stopwords.is_empty() {
            return false;
        }
        let lower = secret.to_lowercase();
        self.stopwords.iter().any(|w| lower.contains(w.as_str()))
    }
}

#[derive(Debug)]
pub struct Rule {
    pub id: String,
    pub description: String,
    regex: Regex,
    secret_group: usize,
    entropy: Option<f64>,
    keywords: Option<AhoCorasick>,
    allowlist: Allowlist,
}

impl Rule {
    /// The capture holding the secret: the configured group, else the first
    /// group when the regex has one, else the whole match.
    fn secret_of<'t>(&self, caps: &Captures<'t>) -> Option<&'t str> {
        let group = if self.secret_group > 0 {
            self.secret_group
        } else if caps.len() > 1 {
            1
        } else {
            0
        };
        caps.get(group).or_else(|| caps.get(0)).map(|m| m.as_str())
    }

    fn applies_to(&self, text: &str) -> bool {
        self.keywords.as_ref().map_or(true, |ac| ac.is_match(text))
    }
}

#[derive(Debug)]
pub struct RuleSet {
    rules: Vec<Rule>,
    allowlist: Allowlist,
}

impl RuleSet {
    /// The bundled ruleset.
    pub fn builtin() -> Result<Self> {
        let rules = DEFAULT_RULES
            .iter()
            .map(|def| {
                let stopwords = if def.id == "generic-api-key" {
                    DEFAULT_STOPWORDS.iter().map(|s| s.to_string()).collect()
                } else {
                    Vec::new()
                };
                Ok(Rule {
                    id: def.id.to_string(),
                    description: def.description.to_string(),
                    regex: compile_regex(def.id, def.regex)?,
                    secret_group: def.secret_group,
                    entropy: def.entropy,
                    keywords: compile_keywords(def.id, def.keywords)?,
                    allowlist: Allowlist {
                        regexes: Vec::new(),
                        stopwords,
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(RuleSet {
            rules,
            allowlist: Allowlist::default(),
        })
    }

    /// Parse a TOML ruleset. With `[extend] useDefault = true` the custom
    /// rules are appended to the bundled ones.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: RulesetFile = toml::from_str(contents)?;

        let mut ruleset = if file.extend.use_default {
            RuleSet::builtin()?
        } else {
            RuleSet {
                rules: Vec::new(),
                allowlist: Allowlist::default(),
            }
        };

        for raw in file.rules {
            let regex = compile_regex(&raw.id, &raw.regex)?;
            let allowlist = Allowlist::compile(raw.allowlist, &raw.id)?;
            ruleset.rules.push(Rule {
                description: raw.description.unwrap_or_else(|| raw.id.clone()),
                regex,
                secret_group: raw.secret_group,
                entropy: raw.entropy,
                keywords: compile_keywords(&raw.id, raw.keywords.as_slice())?,
                allowlist,
                id: raw.id,
            });
        }

        let global = Allowlist::compile(file.allowlist, "allowlist")?;
        ruleset.allowlist.regexes.extend(global.regexes);
        ruleset.allowlist.stopwords.extend(global.stopwords);
        Ok(ruleset)
    }

    /// Load a TOML ruleset file. Any failure here is fatal for startup.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| Error::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        let ruleset = RuleSet::from_toml(&contents)?;
        for rule in &ruleset.rules {
            debug!(rule = %rule.id, description = %rule.description, "rule loaded");
        }
        info!(path = %path.display(), rules = ruleset.len(), "loaded custom ruleset");
        Ok(ruleset)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn rule_ids(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.id.as_str())
    }
}

impl Detector for RuleSet {
    fn detect(&self, text: &str) -> Vec<Finding> {
        let mut findings = Vec::new();

        for rule in &self.rules {
            if !rule.applies_to(text) {
                continue;
            }
            for caps in rule.regex.captures_iter(text) {
                let Some(secret) = rule.secret_of(&caps) else {
                    continue;
                };
                if secret.is_empty() {
                    continue;
                }
                if let Some(min) = rule.entropy {
                    if shannon_entropy(secret) < min {
                        continue;
                    }
                }
                if rule.allowlist.allows(secret) || self.allowlist.allows(secret) {
                    continue;
                }
                findings.push(Finding {
                    secret: secret.to_string(),
                    rule_id: rule.id.clone(),
                });
            }
        }

        findings
    }
}

/// Case-insensitive keyword prefilter. `None` when the rule has no keywords.
fn compile_keywords<S: AsRef<str>>(rule: &str, keywords: &[S]) -> Result<Option<AhoCorasick>> {
    let keywords: Vec<&str> = keywords
        .iter()
        .map(|k| k.as_ref())
        .filter(|k| !k.is_empty())
        .collect();
    if keywords.is_empty() {
        return Ok(None);
    }
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(&keywords)
        .map(Some)
        .map_err(|source| Error::Keywords {
            rule: rule.to_string(),
            source,
        })
}

fn compile_regex(rule: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| Error::RuleRegex {
        rule: rule.to_string(),
        source,
    })
}

/// Shannon entropy of a string, in bits per byte
fn shannon_entropy(s: &str) -> f64 {
    let len = s.len() as f64;
    if len == 0.0 {
        return 0.0;
    }
    let mut freq: HashMap<u8, usize> = HashMap::new();
    for &b in s.as_bytes() {
        *freq.entry(b).or_insert(0) += 1;
    }
    freq.values().fold(0.0, |acc, &count| {
        let p = count as f64 / len;
        acc - p * p.log2()
    })
}

// ─── TOML ruleset layout ──────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct RulesetFile {
    #[serde(default)]
    extend: ExtendSpec,
    #[serde(default)]
    rules: Vec<RuleSpec>,
    #[serde(default)]
    allowlist: AllowlistSpec,
}

#[derive(Debug, Default, Deserialize)]
struct ExtendSpec {
    #[serde(default, rename = "useDefault")]
    use_default: bool,
}

#[derive(Debug, Deserialize)]
struct RuleSpec {
    id: String,
    #[serde(default)]
    description: Option<String>,
    regex: String,
    #[serde(default, rename = "secretGroup")]
    secret_group: usize,
    #[serde(default)]
    entropy: Option<f64>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    allowlist: AllowlistSpec,
}

#[derive(Debug, Default, Deserialize)]
struct AllowlistSpec {
    #[serde(default)]
    regexes: Vec<String>,
    #[serde(default)]
    stopwords: Vec<String>,
}
