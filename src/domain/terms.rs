wire_enum! {
    PaymentTerms("payment terms") {
        OneTimePayment => "one_time_payment",
        Installment => "installment",
        MilestoneBased => "milestone_based",
        Others => "others",
    }
}

impl PaymentTerms {
    pub fn label(self) -> &'static str {
        match self {
            PaymentTerms::OneTimePayment => "One Time Payment",
            PaymentTerms::Installment => "Installment",
            PaymentTerms::MilestoneBased => "Milestone Based",
            PaymentTerms::Others => "Others",
        }
    }
}

wire_enum! {
    RenewalTerms("renewal terms") {
        RenewableFixed => "renewable_fixed",
        NotRenewable => "not_renewable",
        OnRequest => "on_request",
    }
}

impl RenewalTerms {
    pub fn label(self) -> &'static str {
        match self {
            RenewalTerms::RenewableFixed => "Renewable (fixed terms)",
            RenewalTerms::NotRenewable => "Not Renewable",
            RenewalTerms::OnRequest => "On Request",
        }
    }
}

impl Default for RenewalTerms {
    fn default() -> Self {
        RenewalTerms::NotRenewable
    }
}
