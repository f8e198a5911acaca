wire_enum! {
    /// Workflow status of a contract.
    ContractStatus("contract status") {
        Draft => "draft",
        Submitted => "submitted",
        Approved => "approved",
        Rejected => "rejected",
        Returned => "returned",
    }
}

impl ContractStatus {
    /// Statuses reachable in one step.
    pub fn allowed_transitions(self) -> &'static [ContractStatus] {
        use ContractStatus::*;
        match self {
            Draft => &[Submitted],
            Submitted => &[Approved, Rejected, Returned],
            Returned => &[Submitted, Draft],
            Approved | Rejected => &[],
        }
    }

    pub fn can_transition_to(self, next: ContractStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    pub fn label(self) -> &'static str {
        match self {
            ContractStatus::Draft => "Draft",
            ContractStatus::Submitted => "Submitted",
            ContractStatus::Approved => "Approved",
            ContractStatus::Rejected => "Rejected",
            ContractStatus::Returned => "Returned",
        }
    }
}

impl Default for ContractStatus {
    fn default() -> Self {
        ContractStatus::Draft
    }
}
