use chrono::{DateTime, Datelike, Local, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Largest amount a single record may carry
pub const MAX_AMOUNT: u64 = 999_999_999_999;

/// Avatar colour used when a profile never picked one
pub const DEFAULT_AVATAR_COLOR: &str = "#3B82F6";

/// How long a notification stays on screen unless configured otherwise
pub const DEFAULT_DISMISS_MS: u64 = 2500;

/// Kind of financial record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    /// Money spent
    #[default]
    Expense,
    /// Income for the month
    Salary,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Expense => "expense",
            RecordKind::Salary => "salary",
        }
    }

    /// Parse a stored kind. Anything that is not "salary" is an expense.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("salary") {
            RecordKind::Salary
        } else {
            RecordKind::Expense
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A filing period. `month` is zero based (0 = January, 11 = December).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    pub month: u32,
    pub year: i32,
}

impl Period {
    /// Build a period, rejecting months outside 0..=11
    pub fn new(month: u32, year: i32) -> Option<Self> {
        (month < 12).then_some(Self { month, year })
    }

    /// The period a calendar date falls in
    pub fn of(date: NaiveDate) -> Self {
        Self {
            month: date.month0(),
            year: date.year(),
        }
    }

    /// The period containing today's local date
    pub fn current() -> Self {
        Self::of(Local::now().date_naive())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.month0() == self.month && date.year() == self.year
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month + 1, 1)
    }

    pub fn days_in_month(&self) -> u32 {
        let (next_year, next_month) = if self.month >= 11 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 2)
        };
        match (self.first_day(), NaiveDate::from_ymd_opt(next_year, next_month, 1)) {
            (Some(start), Some(end)) => (end - start).num_days() as u32,
            _ => 0,
        }
    }

    /// Date in this period with the given day of month, clamped to the
    /// last day of the month (31 in February becomes 28 or 29).
    pub fn clamp_day(&self, day: u32) -> Option<NaiveDate> {
        let last = self.days_in_month();
        if last == 0 {
            return None;
        }
        NaiveDate::from_ymd_opt(self.year, self.month + 1, day.clamp(1, last))
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.month + 1, self.year)
    }
}

/// A single income or expense entry filed under a month/year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialRecord {
    /// Store-assigned identifier, format "record::<uuid>"
    pub id: String,
    /// ID of the user this record belongs to
    pub owner_id: String,
    #[serde(default)]
    pub kind: RecordKind,
    /// Name of the expense or note of the salary
    #[serde(default)]
    pub label: String,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub amount: u64,
    /// Calendar date the money moved
    pub occurred_on: NaiveDate,
    /// Filing month, zero based
    pub month: u32,
    /// Filing year
    pub year: i32,
    #[serde(default)]
    pub pinned: bool,
    /// Server-assigned creation timestamp
    pub created_at: DateTime<Utc>,
}

impl FinancialRecord {
    pub fn generate_id() -> String {
        format!("record::{}", uuid::Uuid::new_v4().simple())
    }

    pub fn period(&self) -> Period {
        Period {
            month: self.month,
            year: self.year,
        }
    }

    pub fn is_salary(&self) -> bool {
        self.kind == RecordKind::Salary
    }
}

/// Coerce a stored amount into an integer, the way the UI always has:
/// thousands separators are dropped and anything unreadable counts as 0.
/// Amounts above `MAX_AMOUNT` can only come from a misbehaving writer and
/// count as 0 as well.
pub fn coerce_amount(raw: &str) -> u64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if let Ok(value) = cleaned.parse::<u64>() {
        return within_limit(value);
    }
    match cleaned.parse::<f64>() {
        Ok(value) => float_amount(value),
        _ => 0,
    }
}

fn within_limit(value: u64) -> u64 {
    if value > MAX_AMOUNT {
        0
    } else {
        value
    }
}

fn float_amount(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 && value <= MAX_AMOUNT as f64 {
        value as u64
    } else {
        0
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAmount {
    Int(u64),
    Float(f64),
    Text(String),
}

fn lenient_amount<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawAmount>::deserialize(deserializer).unwrap_or(None);
    Ok(match raw {
        Some(RawAmount::Int(value)) => within_limit(value),
        Some(RawAmount::Float(value)) => float_amount(value),
        Some(RawAmount::Text(text)) => coerce_amount(&text),
        None => 0,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AmountInput {
    Text(String),
    Number(serde_json::Number),
}

/// Accept the typed amount either as a JSON string or a JSON number
fn amount_input<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match AmountInput::deserialize(deserializer)? {
        AmountInput::Text(text) => text,
        AmountInput::Number(number) => number.to_string(),
    })
}

/// Form input for a new record, before validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRecordRequest {
    pub kind: RecordKind,
    /// Expense name or salary note
    #[serde(default)]
    pub label: String,
    /// Amount exactly as typed
    #[serde(deserialize_with = "amount_input")]
    pub amount: String,
    pub occurred_on: NaiveDate,
}

/// Orderings offered by the record list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortMode {
    #[default]
    Newest,
    Oldest,
    HighAmount,
    LowAmount,
}

/// Income, expense and remainder over some span of time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PeriodTotals {
    pub income: u64,
    pub expense: u64,
    /// May be negative when more was spent than earned
    pub remainder: i64,
}

impl PeriodTotals {
    pub fn new(income: u64, expense: u64) -> Self {
        Self {
            income,
            expense,
            remainder: signed_difference(income, expense),
        }
    }

    /// Negative remainders are rendered in the alert colour
    pub fn is_overspent(&self) -> bool {
        self.remainder < 0
    }
}

/// `income - expense`, saturating at the bounds of `i64`
fn signed_difference(income: u64, expense: u64) -> i64 {
    let difference = i128::from(income) - i128::from(expense);
    i64::try_from(difference).unwrap_or(if difference < 0 { i64::MIN } else { i64::MAX })
}

/// One bar group of the yearly chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyPoint {
    /// Zero based month
    pub month: u32,
    pub income: u64,
    pub expense: u64,
    /// Clamped at zero, the chart never draws a negative remainder
    pub remainder: u64,
}

/// Totals and counters for one period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthSummary {
    pub period: Period,
    pub totals: PeriodTotals,
    pub record_count: usize,
    pub expense_count: usize,
    pub salary_count: usize,
    pub pinned_count: usize,
}

/// Data behind the yearly chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearChart {
    pub year: i32,
    pub months: Vec<MonthlyPoint>,
    pub totals: PeriodTotals,
}

/// Avatar kinds a profile can pick from.
/// Unrecognised stored names land on `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AvatarGlyph {
    #[default]
    User,
    Smile,
    Star,
    Heart,
    Coffee,
    Wallet,
    PiggyBank,
    Cat,
    Dog,
    Rocket,
    Sun,
    Moon,
    #[serde(other)]
    Unknown,
}

impl AvatarGlyph {
    pub const ALL: [AvatarGlyph; 12] = [
        AvatarGlyph::User,
        AvatarGlyph::Smile,
        AvatarGlyph::Star,
        AvatarGlyph::Heart,
        AvatarGlyph::Coffee,
        AvatarGlyph::Wallet,
        AvatarGlyph::PiggyBank,
        AvatarGlyph::Cat,
        AvatarGlyph::Dog,
        AvatarGlyph::Rocket,
        AvatarGlyph::Sun,
        AvatarGlyph::Moon,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AvatarGlyph::User => "User",
            AvatarGlyph::Smile => "Smile",
            AvatarGlyph::Star => "Star",
            AvatarGlyph::Heart => "Heart",
            AvatarGlyph::Coffee => "Coffee",
            AvatarGlyph::Wallet => "Wallet",
            AvatarGlyph::PiggyBank => "PiggyBank",
            AvatarGlyph::Cat => "Cat",
            AvatarGlyph::Dog => "Dog",
            AvatarGlyph::Rocket => "Rocket",
            AvatarGlyph::Sun => "Sun",
            AvatarGlyph::Moon => "Moon",
            AvatarGlyph::Unknown => "Unknown",
        }
    }

    pub fn from_name(name: &str) -> Self {
        Self::ALL
            .iter()
            .copied()
            .find(|glyph| glyph.name() == name)
            .unwrap_or(AvatarGlyph::Unknown)
    }
}

/// A user's profile document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Same as the identity uid
    pub id: String,
    pub display_name: String,
    /// Fixed at sign-up
    pub email: String,
    #[serde(default)]
    pub avatar: AvatarGlyph,
    #[serde(default = "default_avatar_color")]
    pub avatar_color: String,
    /// Admin gate, set at sign-up
    #[serde(default)]
    pub approved: bool,
    pub created_at: DateTime<Utc>,
}

fn default_avatar_color() -> String {
    DEFAULT_AVATAR_COLOR.to_string()
}

/// Partial update of a profile document. `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub avatar: Option<AvatarGlyph>,
    pub avatar_color: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Error,
}

/// Transient, auto-dismissing message for the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    pub dismiss_after_ms: u64,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Success,
            message: message.into(),
            dismiss_after_ms: DEFAULT_DISMISS_MS,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Error,
            message: message.into(),
            dismiss_after_ms: DEFAULT_DISMISS_MS,
        }
    }

    pub fn with_dismiss_after(mut self, millis: u64) -> Self {
        self.dismiss_after_ms = millis;
        self
    }

    pub fn is_error(&self) -> bool {
        self.kind == NotificationKind::Error
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemePreference {
    #[default]
    Light,
    Dark,
}

impl ThemePreference {
    pub fn toggled(self) -> Self {
        match self {
            ThemePreference::Light => ThemePreference::Dark,
            ThemePreference::Dark => ThemePreference::Light,
        }
    }
}

/// Current theme, returned after reading or toggling it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeResponse {
    pub theme: ThemePreference,
}

/// Request to create an account
#[derive(Clone, Serialize, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

/// Request to sign in
#[derive(Clone, Serialize, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

/// Response after sign-up or sign-in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResponse {
    pub profile: Option<UserProfile>,
    /// Bearer token for later requests; only issued by sign-in
    #[serde(default)]
    pub token: Option<String>,
    pub notification: Notification,
}

/// Records of one period, already sorted, with the period summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordListResponse {
    pub period: Period,
    pub sort: SortMode,
    pub records: Vec<FinancialRecord>,
    pub pinned: Vec<FinancialRecord>,
    pub summary: MonthSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRecordResponse {
    pub record: FinancialRecord,
    pub notification: Notification,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteRecordResponse {
    /// False when the record was already gone
    pub deleted: bool,
    pub notification: Notification,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletePeriodResponse {
    pub deleted_count: usize,
    pub notification: Notification,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetPinnedRequest {
    pub pinned: bool,
}

/// User intents forwarded to the account settings flow
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AccountIntent {
    BeginNameEdit,
    SaveName { name: String },
    BeginAvatarEdit,
    SaveAvatar { avatar: AvatarGlyph, avatar_color: String },
    BeginPasswordChange,
    VerifyCurrentPassword { password: String },
    SubmitNewPassword { new_password: String, confirmation: String },
    BeginDeletion,
    ConfirmDeletion { typed_name: String },
    Reauthenticate { password: String },
    Cancel,
}

impl AccountIntent {
    /// Name of the intent, safe to log (never includes passwords)
    pub fn name(&self) -> &'static str {
        match self {
            AccountIntent::BeginNameEdit => "begin_name_edit",
            AccountIntent::SaveName { .. } => "save_name",
            AccountIntent::BeginAvatarEdit => "begin_avatar_edit",
            AccountIntent::SaveAvatar { .. } => "save_avatar",
            AccountIntent::BeginPasswordChange => "begin_password_change",
            AccountIntent::VerifyCurrentPassword { .. } => "verify_current_password",
            AccountIntent::SubmitNewPassword { .. } => "submit_new_password",
            AccountIntent::BeginDeletion => "begin_deletion",
            AccountIntent::ConfirmDeletion { .. } => "confirm_deletion",
            AccountIntent::Reauthenticate { .. } => "reauthenticate",
            AccountIntent::Cancel => "cancel",
        }
    }
}

/// Where the account settings flow currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStage {
    Idle,
    EditingName,
    EditingAvatar,
    VerifyCurrentPassword,
    ChooseNewPassword,
    ConfirmingDeletion,
    Saving,
    Reauthenticating,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountFlowResponse {
    pub stage: AccountStage,
    pub profile: Option<UserProfile>,
    pub notification: Option<Notification>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_contains_and_clamp() {
        let feb = Period::new(1, 2024).unwrap();
        assert!(feb.contains(NaiveDate::from_ymd_opt(2024, 2, 10).unwrap()));
        assert!(!feb.contains(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()));
        assert!(!feb.contains(NaiveDate::from_ymd_opt(2023, 2, 10).unwrap()));
        assert_eq!(feb.days_in_month(), 29);
        assert_eq!(feb.clamp_day(31), NaiveDate::from_ymd_opt(2024, 2, 29));
        assert_eq!(Period::new(11, 2023).unwrap().days_in_month(), 31);
        assert!(Period::new(12, 2024).is_none());
    }

    #[test]
    fn test_period_display_is_one_based() {
        assert_eq!(Period::new(5, 2024).unwrap().to_string(), "6/2024");
    }

    #[test]
    fn test_coerce_amount() {
        assert_eq!(coerce_amount("1,500"), 1500);
        assert_eq!(coerce_amount(" 42 "), 42);
        assert_eq!(coerce_amount("abc"), 0);
        assert_eq!(coerce_amount(""), 0);
        assert_eq!(coerce_amount("-20"), 0);
        assert_eq!(coerce_amount("999,999,999,999"), MAX_AMOUNT);
    }

    #[test]
    fn test_out_of_range_stored_amounts_count_as_zero() {
        assert_eq!(coerce_amount("1e19"), 0);
        assert_eq!(coerce_amount("1000000000000"), 0);
        assert_eq!(coerce_amount("18446744073709551615"), 0);
        let record: FinancialRecord = serde_json::from_str(
            r#"{"id":"r","owner_id":"u1","amount":10000000000000000000,"occurred_on":"2024-06-03",
                "month":5,"year":2024,"created_at":"2024-06-03T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(record.amount, 0);
    }

    #[test]
    fn test_totals_never_overflow() {
        let income_only = PeriodTotals::new(u64::MAX, 0);
        assert_eq!(income_only.remainder, i64::MAX);
        assert!(!income_only.is_overspent());

        let overspent = PeriodTotals::new(1, u64::MAX);
        assert_eq!(overspent.remainder, i64::MIN);
        assert!(overspent.is_overspent());

        assert_eq!(PeriodTotals::new(1 << 63, 1).remainder, i64::MAX);
    }

    #[test]
    fn test_record_deserializes_with_lenient_amount_and_defaults() {
        let json = r#"{
            "id": "record::1",
            "owner_id": "u1",
            "amount": "12,000",
            "occurred_on": "2024-06-03",
            "month": 5,
            "year": 2024,
            "created_at": "2024-06-03T10:00:00Z"
        }"#;
        let record: FinancialRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.amount, 12_000);
        assert_eq!(record.kind, RecordKind::Expense);
        assert!(!record.pinned);
        assert_eq!(record.label, "");

        let broken = json.replace("\"12,000\"", "null");
        let record: FinancialRecord = serde_json::from_str(&broken).unwrap();
        assert_eq!(record.amount, 0);
    }

    #[test]
    fn test_unknown_avatar_name_falls_back() {
        let glyph: AvatarGlyph = serde_json::from_str("\"Unicorn\"").unwrap();
        assert_eq!(glyph, AvatarGlyph::Unknown);
        assert_eq!(AvatarGlyph::from_name("Cat"), AvatarGlyph::Cat);
        assert_eq!(AvatarGlyph::from_name("cat"), AvatarGlyph::Unknown);
    }

    #[test]
    fn test_create_request_accepts_numeric_amount() {
        let json = r#"{"kind":"salary","amount":50000,"occurred_on":"2024-06-01"}"#;
        let request: CreateRecordRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.amount, "50000");
        assert_eq!(request.label, "");
    }

    #[test]
    fn test_sort_mode_wire_names() {
        assert_eq!(serde_json::to_string(&SortMode::HighAmount).unwrap(), "\"highAmount\"");
        let mode: SortMode = serde_json::from_str("\"lowAmount\"").unwrap();
        assert_eq!(mode, SortMode::LowAmount);
    }

    #[test]
    fn test_account_intent_tagging() {
        let json = r#"{"action":"confirm_deletion","typed_name":"An"}"#;
        let intent: AccountIntent = serde_json::from_str(json).unwrap();
        assert_eq!(intent.name(), "confirm_deletion");
    }
}
