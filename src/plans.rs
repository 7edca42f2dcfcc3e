//! Subscription plan catalog.
//!
//! Static data only. Prices are in paise (1/100 INR), the unit the order
//! API expects.

use serde::Serialize;

/// Length of the free trial in days.
pub const FREE_TRIAL_DAYS: u32 = 14;

/// Limit value that stands for "unlimited".
pub const UNLIMITED: u32 = 999_999;

/// Plan tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Time-limited trial.
    FreeTrial,
    /// Entry paid tier.
    Basic,
    /// Top tier.
    Premium,
}

/// How often a plan is billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    /// Every month.
    Monthly,
    /// Every year.
    Yearly,
}

/// Support channel included with a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportLevel {
    /// Community forum.
    Community,
    /// Email.
    Email,
    /// Around-the-clock priority support.
    Priority,
}

/// One purchasable plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    /// Stable identifier, e.g. `"basic_monthly"`.
    pub id: &'static str,
    /// Tier.
    pub tier: Tier,
    /// Billing cycle.
    pub billing_cycle: BillingCycle,
    /// Display name.
    pub name: &'static str,
    /// One-line pitch.
    pub description: &'static str,
    /// Price in paise.
    pub price: u64,
    /// Formatted price.
    pub price_display: &'static str,
    /// Marketing feature list.
    pub features: &'static [&'static str],
    /// Videos per month.
    pub video_limit: u32,
    /// Scene segments per analysis.
    pub scene_limit: u32,
    /// Support channel.
    pub support_level: SupportLevel,
    /// Whether API access is included.
    pub api_access: bool,
}

impl Plan {
    /// Returns `true` for plans that cost nothing.
    pub fn is_free(&self) -> bool {
        self.price == 0
    }

    /// Returns `true` if `limit` means "unlimited".
    pub fn is_unlimited(limit: u32) -> bool {
        limit >= UNLIMITED
    }
}

const BASIC_MONTHLY_PRICE: u64 = 99_900;
const PREMIUM_MONTHLY_PRICE: u64 = 299_900;

const BASIC_FEATURES: &[&str] = &[
    "50 videos/month",
    "Standard scene analysis",
    "Up to 20 scene segments",
    "Email support",
    "Advanced filters",
    "Batch processing (5 videos)",
];

const PREMIUM_FEATURES: &[&str] = &[
    "Unlimited videos",
    "Advanced scene analysis",
    "Unlimited scene segments",
    "Priority support (24/7)",
    "API access",
    "Batch processing (unlimited)",
    "Video history (lifetime)",
    "Custom branding",
    "Team collaboration (up to 5 users)",
];

/// Every plan, cheapest first.
pub static PLANS: [Plan; 5] = [
    Plan {
        id: "free_trial",
        tier: Tier::FreeTrial,
        billing_cycle: BillingCycle::Monthly,
        name: "Free Trial",
        description: "14 days to explore Timeloop AI",
        price: 0,
        price_display: "Free",
        features: &[
            "5 videos/month",
            "Basic scene analysis",
            "Up to 5 scene segments",
            "Community support",
            "Video preview & download",
        ],
        video_limit: 5,
        scene_limit: 5,
        support_level: SupportLevel::Community,
        api_access: false,
    },
    Plan {
        id: "basic_monthly",
        tier: Tier::Basic,
        billing_cycle: BillingCycle::Monthly,
        name: "Basic Monthly",
        description: "Perfect for content creators",
        price: BASIC_MONTHLY_PRICE,
        price_display: "₹999/month",
        features: BASIC_FEATURES,
        video_limit: 50,
        scene_limit: 20,
        support_level: SupportLevel::Email,
        api_access: false,
    },
    Plan {
        id: "basic_yearly",
        tier: Tier::Basic,
        billing_cycle: BillingCycle::Yearly,
        name: "Basic Yearly",
        description: "Save 17% with yearly billing",
        price: BASIC_MONTHLY_PRICE * 10,
        price_display: "₹9,990/year",
        features: BASIC_FEATURES,
        video_limit: 50,
        scene_limit: 20,
        support_level: SupportLevel::Email,
        api_access: false,
    },
    Plan {
        id: "premium_monthly",
        tier: Tier::Premium,
        billing_cycle: BillingCycle::Monthly,
        name: "Premium Monthly",
        description: "For professional teams",
        price: PREMIUM_MONTHLY_PRICE,
        price_display: "₹2,999/month",
        features: PREMIUM_FEATURES,
        video_limit: UNLIMITED,
        scene_limit: UNLIMITED,
        support_level: SupportLevel::Priority,
        api_access: true,
    },
    Plan {
        id: "premium_yearly",
        tier: Tier::Premium,
        billing_cycle: BillingCycle::Yearly,
        name: "Premium Yearly",
        description: "Save 20% with yearly billing",
        price: PREMIUM_MONTHLY_PRICE * 10,
        price_display: "₹29,990/year",
        features: PREMIUM_FEATURES,
        video_limit: UNLIMITED,
        scene_limit: UNLIMITED,
        support_level: SupportLevel::Priority,
        api_access: true,
    },
];

/// Look up a plan by id.
///
/// ```
/// let plan = timeloop::plans::find_plan("premium_monthly").unwrap();
/// assert!(plan.api_access);
/// assert!(timeloop::plans::find_plan("enterprise").is_none());
/// ```
pub fn find_plan(id: &str) -> Option<&'static Plan> {
    PLANS.iter().find(|plan| plan.id == id)
}

/// Plans belonging to a tier.
pub fn plans_for_tier(tier: Tier) -> impl Iterator<Item = &'static Plan> {
    PLANS.iter().filter(move |plan| plan.tier == tier)
}
