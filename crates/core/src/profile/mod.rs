//! Persona profiles. A [`Mode`] picks the system prompt that prefixes every
//! chat request; switching it never touches stored history.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

const CUSTOMER_SERVICE_PROMPT: &str = "\
You are a professional call center customer service representative, able to handle a wide range of customer inquiries and issues.

Follow these guidelines:
1. Stay professional, friendly and polite
2. Give clear, concise answers and avoid long explanations
3. Offer relevant information proactively, but do not oversell
4. If you need more information to answer, ask for it politely
5. If you cannot resolve the issue, offer to escalate to a human agent

Your goal is to resolve the customer's issue efficiently while giving them a good experience.";

const LEAD_GENERATION_PROMPT: &str = "\
You are a professional sales representative responsible for first contact with potential customers and for collecting information.

Follow these guidelines:
1. Introduce yourself and your company in a friendly way
2. Ask about the prospect's needs and pain points
3. Briefly explain how relevant products or services address them
4. Collect key details such as contact information and the best time to follow up
5. Propose a next step such as a demo or sending materials

Your goal is to build an initial relationship and gather enough information for follow-up, not to close the sale in the first conversation.";

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    CustomerService,
    LeadGeneration,
}

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::CustomerService, Mode::LeadGeneration];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::CustomerService => "customer_service",
            Mode::LeadGeneration => "lead_generation",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Mode::CustomerService => "Customer Service",
            Mode::LeadGeneration => "Lead Generation",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown mode {0:?}, expected one of: customer_service, lead_generation")]
pub struct UnknownMode(pub String);

impl FromStr for Mode {
    type Err = UnknownMode;

    /// Accepts the snake_case id or the display label, case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match norm.as_str() {
            "customer_service" | "cs" => Ok(Mode::CustomerService),
            "lead_generation" | "lead" => Ok(Mode::LeadGeneration),
            _ => Err(UnknownMode(s.to_owned())),
        }
    }
}

pub fn profile(mode: Mode) -> &'static str {
    match mode {
        Mode::CustomerService => CUSTOMER_SERVICE_PROMPT,
        Mode::LeadGeneration => LEAD_GENERATION_PROMPT,
    }
}
