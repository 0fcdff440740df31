use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use crate::config::ApprovalPolicy;
use crate::domain::employee::{Employee, Handle};
use crate::errors::DomainError;

/// Document shape of the org directory source file.
#[derive(Debug, Deserialize)]
pub struct DirectoryDocument {
    pub employees: Vec<Employee>,
}

/// Static lookup of employees, managers, and role flags. Read-only
/// shared state during a tick; reloaded wholesale, never patched.
#[derive(Clone, Debug, Default)]
pub struct OrgDirectory {
    by_email: HashMap<String, Employee>,
    email_by_handle: HashMap<Handle, String>,
}

impl OrgDirectory {
    pub fn new(employees: Vec<Employee>) -> Self {
        let mut by_email = HashMap::new();
        let mut email_by_handle = HashMap::new();
        for employee in employees {
            email_by_handle.insert(employee.handle.clone(), employee.email.clone());
            by_email.insert(employee.email.clone(), employee);
        }
        Self { by_email, email_by_handle }
    }

    pub fn from_json(raw: &str) -> Result<Self, DomainError> {
        let document: DirectoryDocument = serde_json::from_str(raw)
            .map_err(|err| DomainError::validation(format!("invalid directory document: {err}")))?;
        Ok(Self::new(document.employees))
    }

    pub fn len(&self) -> usize {
        self.by_email.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_email.is_empty()
    }

    pub fn lookup_email(&self, email: &str) -> Option<&Employee> {
        self.by_email.get(email)
    }

    pub fn lookup_handle(&self, handle: &Handle) -> Option<&Employee> {
        self.email_by_handle.get(handle).and_then(|email| self.by_email.get(email))
    }

    pub fn manager_of(&self, employee: &Employee) -> Option<&Employee> {
        employee.manager.as_deref().and_then(|email| self.by_email.get(email))
    }

    /// HR staff sorted by email so escalation routing is deterministic.
    pub fn hr_staff(&self) -> Vec<&Employee> {
        let mut staff: Vec<&Employee> =
            self.by_email.values().filter(|employee| employee.is_hr).collect();
        staff.sort_by(|left, right| left.email.cmp(&right.email));
        staff
    }

    pub fn direct_reports(&self, manager_email: &str) -> Vec<&Employee> {
        self.by_email
            .values()
            .filter(|employee| employee.manager.as_deref() == Some(manager_email))
            .collect()
    }

    pub fn is_manager(&self, email: &str) -> bool {
        self.by_email.values().any(|employee| employee.manager.as_deref() == Some(email))
    }

    /// Build the ordered approver list for an absence of `duration_days`.
    ///
    /// Empty chain means auto-approve. Above the auto-approve threshold
    /// the direct manager approves; above the senior threshold the
    /// nearest senior-manager ancestor is appended as a second level.
    /// A required level with no manager falls back to an HR-flagged
    /// entry. A cycle in the manager graph fails the build; callers
    /// escalate rather than approve.
    pub fn approval_chain(
        &self,
        employee: &Employee,
        duration_days: u32,
        policy: &ApprovalPolicy,
    ) -> Result<Vec<Employee>, DomainError> {
        if duration_days <= policy.auto_approve_days {
            return Ok(Vec::new());
        }

        let mut chain: Vec<Employee> = Vec::new();

        match self.manager_of(employee) {
            Some(manager) if manager.email == employee.email => {
                return Err(DomainError::CycleDetected { at: employee.email.clone() });
            }
            Some(manager) => chain.push(manager.clone()),
            None => {
                // No manager at all: route straight to HR.
                if let Some(hr) = self.hr_staff().first() {
                    chain.push((*hr).clone());
                }
                return Ok(chain);
            }
        }

        if duration_days > policy.senior_approval_days {
            match self.nearest_senior_manager(chain.first())? {
                Some(senior) if !chain.iter().any(|entry| entry.email == senior.email) => {
                    chain.push(senior);
                }
                Some(_) => {}
                None => {
                    if let Some(hr) = self
                        .hr_staff()
                        .into_iter()
                        .find(|hr| !chain.iter().any(|entry| entry.email == hr.email))
                    {
                        chain.push(hr.clone());
                    }
                }
            }
        }

        Ok(chain)
    }

    /// Walk manager pointers from `start`, skipping non-flagged managers,
    /// until a senior manager is found. Carries an explicit visited set;
    /// a revisit is a `CycleDetected` error, never an infinite loop.
    fn nearest_senior_manager(
        &self,
        start: Option<&Employee>,
    ) -> Result<Option<Employee>, DomainError> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut current = start.cloned();

        while let Some(employee) = current {
            if !visited.insert(employee.email.clone()) {
                return Err(DomainError::CycleDetected { at: employee.email });
            }
            if employee.is_senior_manager {
                return Ok(Some(employee));
            }
            current = self.manager_of(&employee).cloned();
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::OrgDirectory;
    use crate::config::ApprovalPolicy;
    use crate::domain::employee::{Employee, Handle};
    use crate::errors::DomainError;

    fn employee(
        handle: &str,
        email: &str,
        manager: Option<&str>,
        senior: bool,
        hr: bool,
    ) -> Employee {
        Employee {
            handle: Handle(handle.to_string()),
            email: email.to_string(),
            name: email.split('@').next().unwrap_or(email).to_string(),
            department: "engineering".to_string(),
            manager: manager.map(str::to_string),
            is_senior_manager: senior,
            is_hr: hr,
        }
    }

    fn directory() -> OrgDirectory {
        OrgDirectory::new(vec![
            employee("U-dev", "dev@example.com", Some("mgr@example.com"), false, false),
            employee("U-mgr", "mgr@example.com", Some("vp@example.com"), false, false),
            employee("U-vp", "vp@example.com", None, true, false),
            employee("U-hr", "hr@example.com", None, false, true),
        ])
    }

    fn policy() -> ApprovalPolicy {
        ApprovalPolicy { auto_approve_days: 2, senior_approval_days: 5, ..ApprovalPolicy::default() }
    }

    #[test]
    fn short_absence_yields_empty_chain() {
        let directory = directory();
        let dev = directory.lookup_email("dev@example.com").expect("dev").clone();

        let chain = directory.approval_chain(&dev, 2, &policy()).expect("chain");
        assert!(chain.is_empty());
    }

    #[test]
    fn mid_length_absence_requires_direct_manager_only() {
        let directory = directory();
        let dev = directory.lookup_email("dev@example.com").expect("dev").clone();

        let chain = directory.approval_chain(&dev, 5, &policy()).expect("chain");
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].email, "mgr@example.com");
    }

    #[test]
    fn long_absence_appends_nearest_senior_ancestor() {
        let directory = directory();
        let dev = directory.lookup_email("dev@example.com").expect("dev").clone();

        let chain = directory.approval_chain(&dev, 7, &policy()).expect("chain");
        let emails: Vec<&str> = chain.iter().map(|entry| entry.email.as_str()).collect();
        assert_eq!(emails, vec!["mgr@example.com", "vp@example.com"]);
    }

    #[test]
    fn senior_manager_is_not_duplicated_when_already_the_direct_manager() {
        let directory = OrgDirectory::new(vec![
            employee("U-dev", "dev@example.com", Some("vp@example.com"), false, false),
            employee("U-vp", "vp@example.com", None, true, false),
        ]);
        let dev = directory.lookup_email("dev@example.com").expect("dev").clone();

        let chain = directory.approval_chain(&dev, 7, &policy()).expect("chain");
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].email, "vp@example.com");
    }

    #[test]
    fn missing_manager_falls_back_to_hr() {
        let directory = OrgDirectory::new(vec![
            employee("U-dev", "dev@example.com", None, false, false),
            employee("U-hr", "hr@example.com", None, false, true),
        ]);
        let dev = directory.lookup_email("dev@example.com").expect("dev").clone();

        let chain = directory.approval_chain(&dev, 5, &policy()).expect("chain");
        assert_eq!(chain.len(), 1);
        assert!(chain[0].is_hr);
    }

    #[test]
    fn missing_senior_ancestor_falls_back_to_hr() {
        let directory = OrgDirectory::new(vec![
            employee("U-dev", "dev@example.com", Some("mgr@example.com"), false, false),
            employee("U-mgr", "mgr@example.com", None, false, false),
            employee("U-hr", "hr@example.com", None, false, true),
        ]);
        let dev = directory.lookup_email("dev@example.com").expect("dev").clone();

        let chain = directory.approval_chain(&dev, 7, &policy()).expect("chain");
        let emails: Vec<&str> = chain.iter().map(|entry| entry.email.as_str()).collect();
        assert_eq!(emails, vec!["mgr@example.com", "hr@example.com"]);
    }

    #[test]
    fn manager_cycle_fails_the_build_instead_of_looping() {
        let directory = OrgDirectory::new(vec![
            employee("U-dev", "dev@example.com", Some("a@example.com"), false, false),
            employee("U-a", "a@example.com", Some("b@example.com"), false, false),
            employee("U-b", "b@example.com", Some("a@example.com"), false, false),
            employee("U-hr", "hr@example.com", None, false, true),
        ]);
        let dev = directory.lookup_email("dev@example.com").expect("dev").clone();

        let error = directory.approval_chain(&dev, 7, &policy()).expect_err("cycle");
        assert!(matches!(error, DomainError::CycleDetected { .. }));
    }

    #[test]
    fn lookup_works_by_handle_and_email() {
        let directory = directory();
        let by_handle = directory.lookup_handle(&Handle("U-dev".to_string())).expect("by handle");
        let by_email = directory.lookup_email("dev@example.com").expect("by email");
        assert_eq!(by_handle, by_email);
        assert!(directory.lookup_email("ghost@example.com").is_none());
    }

    #[test]
    fn hr_staff_is_sorted_for_deterministic_routing() {
        let directory = OrgDirectory::new(vec![
            employee("U-hr2", "zoe.hr@example.com", None, false, true),
            employee("U-hr1", "amy.hr@example.com", None, false, true),
        ]);
        let staff = directory.hr_staff();
        assert_eq!(staff[0].email, "amy.hr@example.com");
    }

    #[test]
    fn direct_reports_and_is_manager_agree() {
        let directory = directory();
        assert!(directory.is_manager("mgr@example.com"));
        assert!(!directory.is_manager("dev@example.com"));
        assert_eq!(directory.direct_reports("mgr@example.com").len(), 1);
    }
}
