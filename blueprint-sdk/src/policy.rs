//! Support-policy listing, detail and client-side filtering.
//!
//! The list is fetched whole and kept in server order. Filtering runs over
//! the in-memory list and never touches the network.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::api::{ApiClient, Envelope};
use crate::error::Result;

/// `"<min>세 ~ <max>세"` as written in policy eligibility text. Digits are
/// ASCII only.
static AGE_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([0-9]+)세 ~ ([0-9]+)세").expect("age range pattern is valid")
});

/// One row of the policy list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicySummary {
    pub idx: i64,
    pub city: Option<String>,
    pub district: Option<String>,
    /// Category and eligibility text; job, income and age filters read it.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub name: Option<String>,
    pub offer_inst: Option<String>,
    pub manage_inst: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub apply_start_date: Option<String>,
    pub apply_end_date: Option<String>,
}

/// Wire shape of a list entry.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PolicyRecord {
    idx: i64,
    city: Option<String>,
    district: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    name: Option<String>,
    offer_inst: Option<String>,
    manage_inst: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    apply_start_date: Option<String>,
    apply_end_date: Option<String>,
}

impl From<PolicyRecord> for PolicySummary {
    fn from(r: PolicyRecord) -> Self {
        Self {
            idx: r.idx,
            city: r.city,
            district: r.district,
            kind: r.kind,
            name: r.name,
            offer_inst: r.offer_inst,
            manage_inst: r.manage_inst,
            start_date: r.start_date,
            end_date: r.end_date,
            apply_start_date: r.apply_start_date,
            apply_end_date: r.apply_end_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDetail {
    pub idx: i64,
    pub subject: Option<String>,
    pub condition: Option<String>,
    pub content: Option<String>,
    pub scale: Option<String>,
    pub enquiry: Option<String>,
    pub way: Option<String>,
    pub document: Option<String>,
    pub url: Option<String>,
}

/// What the member told us about themselves. Every field is optional; an
/// empty string or an age of 0 counts as not given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
    pub region: Option<String>,
    pub job: Option<String>,
    pub age: Option<u32>,
    pub income: Option<String>,
    pub policy_name: Option<String>,
}

fn given(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|s| !s.is_empty())
}

fn contains(field: &Option<String>, needle: &str) -> bool {
    field.as_deref().is_some_and(|f| f.contains(needle))
}

/// First `"<min>세 ~ <max>세"` range in `text`.
pub fn age_range(text: &str) -> Option<(u64, u64)> {
    let caps = AGE_RANGE.captures(text)?;
    let min = caps[1].parse().ok()?;
    let max = caps[2].parse().ok()?;
    Some((min, max))
}

impl FilterCriteria {
    pub fn is_empty(&self) -> bool {
        given(&self.region).is_none()
            && given(&self.job).is_none()
            && self.age.filter(|a| *a > 0).is_none()
            && given(&self.income).is_none()
            && given(&self.policy_name).is_none()
    }

    /// Every given criterion must hold. A policy missing the field a
    /// criterion reads does not match it.
    pub fn matches(&self, policy: &PolicySummary) -> bool {
        if let Some(region) = given(&self.region) {
            if !contains(&policy.city, region) {
                return false;
            }
        }
        if let Some(job) = given(&self.job) {
            if !contains(&policy.kind, job) {
                return false;
            }
        }
        if let Some(age) = self.age.filter(|a| *a > 0) {
            let in_range = policy
                .kind
                .as_deref()
                .and_then(age_range)
                .is_some_and(|(min, max)| (min..=max).contains(&u64::from(age)));
            if !in_range {
                return false;
            }
        }
        if let Some(income) = given(&self.income) {
            if !contains(&policy.kind, income) {
                return false;
            }
        }
        if let Some(name) = given(&self.policy_name) {
            if !contains(&policy.name, name) {
                return false;
            }
        }
        true
    }
}

/// Stable filter over `policies`.
pub fn filter<'a>(
    policies: &'a [PolicySummary],
    criteria: &FilterCriteria,
) -> Vec<&'a PolicySummary> {
    policies.iter().filter(|p| criteria.matches(p)).collect()
}

pub struct PolicyStore {
    api: Arc<ApiClient>,
    policies: Vec<PolicySummary>,
    detail: Option<PolicyDetail>,
}

impl PolicyStore {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self {
            api,
            policies: Vec::new(),
            detail: None,
        }
    }

    pub fn policies(&self) -> &[PolicySummary] {
        &self.policies
    }

    /// The most recently fetched detail.
    pub fn detail(&self) -> Option<&PolicyDetail> {
        self.detail.as_ref()
    }

    pub fn find(&self, idx: i64) -> Option<&PolicySummary> {
        self.policies.iter().find(|p| p.idx == idx)
    }

    /// Fetch the full list and replace the one held. On error the old list
    /// stays.
    pub async fn get_policy_info(&mut self) -> Result<&[PolicySummary]> {
        let fetched = self
            .api
            .get_json::<Envelope<Vec<PolicyRecord>>>("/policy/list")
            .await
            .and_then(|env| env.into_data("policy list"));
        let records = match fetched {
            Ok(records) => records,
            Err(e) => {
                tracing::error!("Failed to fetch policy list: {e}");
                return Err(e);
            }
        };
        self.policies = records.into_iter().map(PolicySummary::from).collect();
        tracing::debug!("Fetched {} policies", self.policies.len());
        Ok(&self.policies)
    }

    pub async fn get_policy_detail(&mut self, idx: i64) -> Result<&PolicyDetail> {
        let path = format!("/policy/detail/{idx}");
        let fetched = self
            .api
            .get_json::<Envelope<PolicyDetail>>(&path)
            .await
            .and_then(|env| env.into_data("policy detail"));
        match fetched {
            Ok(detail) => Ok(&*self.detail.insert(detail)),
            Err(e) => {
                tracing::error!("Failed to fetch policy detail {idx}: {e}");
                Err(e)
            }
        }
    }

    pub fn filter_policies(&self, criteria: &FilterCriteria) -> Vec<&PolicySummary> {
        filter(&self.policies, criteria)
    }
}
