//! Chat service: orchestrates the confirmation protocol for one message at
//! a time.
//!
//! Each chat turn is an independent request/response cycle; all protocol
//! state lives in the session-keyed [`PendingStore`]. The explicit
//! token-based confirmation channel ([`ChatService::handle_confirmation`])
//! is authoritative; the free-text yes/no path is a thin adapter that looks
//! up the session's pending token and resolves through the same code path.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::executor::{ActionExecutor, ActionResult, ActionStatus, BookingBackend};
use crate::intent::{ActionKind, IntentExtractor};
use crate::proposal::{build_proposal, BuildError, Proposal, ProposalAction, When};
use crate::resolver::{classify_reply, Resolution};
use crate::session::{BookingRef, ServiceRef, SessionContext};
use crate::store::PendingStore;

/// Reply language, detected per message with a configurable default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    En,
    Ar,
}

impl Language {
    /// Detect the language of a message from its script.
    pub fn detect(text: &str, default: Language) -> Language {
        if text.chars().any(|c| ('\u{0600}'..='\u{06FF}').contains(&c)) {
            Language::Ar
        } else if text.chars().any(|c| c.is_ascii_alphabetic()) {
            Language::En
        } else {
            default
        }
    }

    pub fn from_tag(tag: &str) -> Language {
        if tag.eq_ignore_ascii_case("ar") {
            Language::Ar
        } else {
            Language::En
        }
    }
}

/// Client-facing confirmation block. The raw token must be round-tripped by
/// the client in its next request; the server never trusts session affinity
/// alone.
#[derive(Debug, Clone, Serialize)]
pub struct PendingPrompt {
    pub prompt: String,
    pub token: String,
    pub action_kind: ActionKind,
    pub parameters: serde_json::Value,
}

/// Response to one chat message.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub reply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_confirmation: Option<PendingPrompt>,
}

impl ChatReply {
    fn text(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            pending_confirmation: None,
        }
    }
}

/// Protocol orchestration for chat-driven marketplace actions.
pub struct ChatService {
    extractor: Arc<dyn IntentExtractor>,
    store: Arc<PendingStore>,
    executor: ActionExecutor,
    sessions: Mutex<HashMap<String, SessionContext>>,
    default_language: Language,
}

impl ChatService {
    pub fn new(
        extractor: Arc<dyn IntentExtractor>,
        backend: Arc<dyn BookingBackend>,
        ttl_seconds: u64,
        default_language: Language,
    ) -> Self {
        let store = Arc::new(PendingStore::new(ttl_seconds));
        let executor = ActionExecutor::new(store.clone(), backend);
        Self {
            extractor,
            store,
            executor,
            sessions: Mutex::new(HashMap::new()),
            default_language,
        }
    }

    /// The pending confirmation store (read access for adapters and tests).
    pub fn store(&self) -> &Arc<PendingStore> {
        &self.store
    }

    /// Snapshot of a session's context, if the session exists.
    pub async fn session(&self, session_id: &str) -> Option<SessionContext> {
        self.sessions.lock().await.get(session_id).cloned()
    }

    /// Seed the conversation's last-mentioned service (e.g. when the user
    /// navigated from a service detail page).
    pub async fn set_last_service(&self, session_id: &str, service: ServiceRef) {
        let mut sessions = self.sessions.lock().await;
        let ctx = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionContext::new(session_id, None));
        ctx.last_service = Some(service);
    }

    /// Seed an active booking reference into the session context.
    pub async fn add_active_booking(&self, session_id: &str, booking: BookingRef) {
        let mut sessions = self.sessions.lock().await;
        let ctx = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionContext::new(session_id, None));
        ctx.active_bookings.push(booking);
    }

    /// Handle one free-text chat message.
    pub async fn handle_message(
        &self,
        session_id: &str,
        text: &str,
        user_id: Option<String>,
    ) -> ChatReply {
        let lang = Language::detect(text, self.default_language);
        let ctx = self.touch_session(session_id, text, user_id).await;

        // A pending confirmation takes precedence: affirm/reject replies
        // adapt onto the token channel. Anything else falls through and
        // leaves the pending slot intact.
        if let Some(pending) = self.store.get(session_id).await {
            match classify_reply(text) {
                Resolution::Affirm => {
                    let result = self
                        .handle_confirmation(
                            session_id,
                            &pending.token.token,
                            true,
                            ctx.user_id.as_deref(),
                        )
                        .await;
                    return ChatReply::text(render_result(&result, lang));
                }
                Resolution::Reject => {
                    let result = self
                        .handle_confirmation(
                            session_id,
                            &pending.token.token,
                            false,
                            ctx.user_id.as_deref(),
                        )
                        .await;
                    return ChatReply::text(render_result(&result, lang));
                }
                Resolution::Unrelated => {}
            }
        }

        let Some(draft) = self.extractor.classify(text, &ctx.recent_history).await else {
            return ChatReply::text(messages::no_intent(lang));
        };

        let proposal = match build_proposal(&draft, &ctx) {
            Ok(proposal) => proposal,
            Err(BuildError::UnsupportedIntent(kind)) => {
                tracing::debug!(session_id = %session_id, kind = %kind, "Unsupported intent");
                return ChatReply::text(messages::unsupported(lang));
            }
        };

        self.remember_service(session_id, &proposal).await;

        if !proposal.is_complete() {
            return ChatReply::text(messages::clarify(&proposal.missing_fields, lang));
        }

        let prompt = messages::confirm_prompt(&proposal.action, lang);
        let parameters = proposal.parameters();
        let action_kind = proposal.action.kind();
        match self.store.issue(session_id, proposal).await {
            Ok(token) => ChatReply {
                reply: prompt.clone(),
                pending_confirmation: Some(PendingPrompt {
                    prompt,
                    token: token.token,
                    action_kind,
                    parameters,
                }),
            },
            // Unreachable given the completeness check above, but degrade to
            // a clarification rather than erroring out.
            Err(err) => {
                tracing::error!(session_id = %session_id, error = %err, "Token issuance refused");
                ChatReply::text(messages::no_intent(lang))
            }
        }
    }

    /// Handle an explicit confirm/cancel, the canonical confirmation channel.
    pub async fn handle_confirmation(
        &self,
        session_id: &str,
        token: &str,
        confirm: bool,
        user_id: Option<&str>,
    ) -> ActionResult {
        let effective_user = match user_id {
            Some(id) => Some(id.to_string()),
            None => {
                let sessions = self.sessions.lock().await;
                sessions.get(session_id).and_then(|c| c.user_id.clone())
            }
        };

        let result = self
            .executor
            .execute(session_id, token, effective_user.as_deref(), confirm)
            .await;

        if result.status == ActionStatus::Succeeded {
            self.record_outcome(session_id, &result).await;
        }
        result
    }

    /// Create or refresh the session context and return a snapshot.
    async fn touch_session(
        &self,
        session_id: &str,
        text: &str,
        user_id: Option<String>,
    ) -> SessionContext {
        let mut sessions = self.sessions.lock().await;
        let ctx = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionContext::new(session_id, None));
        if let Some(user_id) = user_id {
            ctx.user_id = Some(user_id);
        }
        ctx.push_history(text);
        ctx.clone()
    }

    /// Remember the service a proposal referenced for later inference.
    async fn remember_service(&self, session_id: &str, proposal: &Proposal) {
        if let ProposalAction::Book {
            service: Some(service),
            ..
        } = &proposal.action
        {
            let mut sessions = self.sessions.lock().await;
            if let Some(ctx) = sessions.get_mut(session_id) {
                ctx.last_service = Some(service.clone());
            }
        }
    }

    /// Keep the session's active-booking list in step with executed actions.
    ///
    /// Derives everything from the executed result's payload, which names the
    /// proposal the executor actually consumed. Re-reading the pending slot
    /// here would race with supersession and could record the wrong proposal.
    async fn record_outcome(&self, session_id: &str, result: &ActionResult) {
        let Some(booking_id) = result
            .result_payload
            .as_ref()
            .and_then(|p| p["booking_id"].as_str())
        else {
            return;
        };
        let mut sessions = self.sessions.lock().await;
        let Some(ctx) = sessions.get_mut(session_id) else {
            return;
        };
        match result.action_kind {
            Some(ActionKind::Book) => {
                let service_name = result
                    .result_payload
                    .as_ref()
                    .and_then(|p| p["service_name"].as_str())
                    .unwrap_or_default()
                    .to_string();
                ctx.active_bookings.push(BookingRef {
                    booking_id: booking_id.to_string(),
                    service_name,
                });
            }
            Some(ActionKind::Cancel) => {
                ctx.active_bookings.retain(|b| b.booking_id != booking_id);
            }
            _ => {}
        }
    }
}

/// Render an action result as a chat reply in the user's language.
fn render_result(result: &ActionResult, lang: Language) -> String {
    match result.status {
        ActionStatus::Succeeded => {
            let booking_id = result
                .result_payload
                .as_ref()
                .and_then(|p| p["booking_id"].as_str())
                .unwrap_or("?");
            match result.action_kind {
                Some(ActionKind::Cancel) => messages::cancelled_booking(booking_id, lang),
                _ => messages::booked(booking_id, lang),
            }
        }
        ActionStatus::Cancelled => messages::declined(lang),
        ActionStatus::Failed => match result.error_reason.as_deref() {
            Some("expired") | Some("invalid") => messages::stale(lang),
            Some("sign_in_required") => messages::sign_in(lang),
            _ => messages::execution_failed(result.detail.as_deref(), lang),
        },
    }
}

/// Bilingual user-facing message templates.
mod messages {
    use super::{Language, ProposalAction, When};

    pub fn no_intent(lang: Language) -> String {
        match lang {
            Language::En => {
                "I can help you book or cancel a service. What would you like to do?".into()
            }
            Language::Ar => "يمكنني مساعدتك في حجز خدمة أو إلغائها. ماذا تريد أن تفعل؟".into(),
        }
    }

    pub fn unsupported(lang: Language) -> String {
        match lang {
            Language::En => "I can't do that yet.".into(),
            Language::Ar => "لا أستطيع فعل ذلك بعد.".into(),
        }
    }

    pub fn clarify(missing: &[String], lang: Language) -> String {
        let field = missing.first().map(String::as_str).unwrap_or("");
        match (field, lang) {
            ("service_reference", Language::En) => {
                "Which service would you like to book?".into()
            }
            ("service_reference", Language::Ar) => "أي خدمة تريد أن تحجز؟".into(),
            ("when", Language::En) => {
                "When would you like it? Please give a date and time.".into()
            }
            ("when", Language::Ar) => "متى تريد الموعد؟ يرجى تحديد التاريخ والوقت.".into(),
            ("booking_id", Language::En) => {
                "Which booking do you mean? Please give its number.".into()
            }
            ("booking_id", Language::Ar) => "أي حجز تقصد؟ يرجى ذكر رقمه.".into(),
            (_, Language::En) => "Could you give me a few more details?".into(),
            (_, Language::Ar) => "هل يمكنك إعطائي المزيد من التفاصيل؟".into(),
        }
    }

    pub fn confirm_prompt(action: &ProposalAction, lang: Language) -> String {
        match action {
            ProposalAction::Book { service, when } => {
                let service = service.as_ref().map(|s| s.name.as_str()).unwrap_or("?");
                let when = describe_when(when.as_ref(), lang);
                match lang {
                    Language::En => format!(
                        "You're about to book {service} ({when}). Reply \"yes\" to confirm or \"no\" to cancel."
                    ),
                    Language::Ar => format!(
                        "أنت على وشك حجز {service} ({when}). رد بـ\"نعم\" للتأكيد أو \"لا\" للإلغاء."
                    ),
                }
            }
            ProposalAction::Cancel { booking_id } => {
                let id = booking_id.as_deref().unwrap_or("?");
                match lang {
                    Language::En => format!(
                        "You're about to cancel booking {id}. Reply \"yes\" to confirm or \"no\" to keep it."
                    ),
                    Language::Ar => format!(
                        "أنت على وشك إلغاء الحجز {id}. رد بـ\"نعم\" للتأكيد أو \"لا\" للإبقاء عليه."
                    ),
                }
            }
        }
    }

    fn describe_when(when: Option<&When>, lang: Language) -> String {
        match when {
            Some(When::At { date, time }) => format!("{date} {time}"),
            Some(When::EarliestAvailable) => match lang {
                Language::En => "earliest available slot".into(),
                Language::Ar => "أقرب موعد متاح".into(),
            },
            None => "?".into(),
        }
    }

    pub fn booked(booking_id: &str, lang: Language) -> String {
        match lang {
            Language::En => format!("Done! Your booking is confirmed (id {booking_id})."),
            Language::Ar => format!("تم! حجزك مؤكد (رقم {booking_id})."),
        }
    }

    pub fn cancelled_booking(booking_id: &str, lang: Language) -> String {
        match lang {
            Language::En => format!("Booking {booking_id} has been cancelled."),
            Language::Ar => format!("تم إلغاء الحجز {booking_id}."),
        }
    }

    pub fn declined(lang: Language) -> String {
        match lang {
            Language::En => "Okay, I won't do that.".into(),
            Language::Ar => "حسناً، لن أفعل ذلك.".into(),
        }
    }

    pub fn stale(lang: Language) -> String {
        match lang {
            Language::En => "That request is no longer valid. Please ask again.".into(),
            Language::Ar => "هذا الطلب لم يعد صالحاً. يرجى الطلب مرة أخرى.".into(),
        }
    }

    pub fn sign_in(lang: Language) -> String {
        match lang {
            Language::En => "Please sign in to confirm this action.".into(),
            Language::Ar => "يرجى تسجيل الدخول لتأكيد هذا الإجراء.".into(),
        }
    }

    pub fn execution_failed(detail: Option<&str>, lang: Language) -> String {
        match lang {
            Language::En => match detail {
                Some(detail) => {
                    format!("Sorry, that didn't go through ({detail}). Please start over.")
                }
                None => "Sorry, that didn't go through. Please start over.".into(),
            },
            Language::Ar => "عذراً، لم يكتمل الطلب. يرجى البدء من جديد.".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::InMemoryBookings;
    use crate::intent::KeywordExtractor;

    fn service_with_backend() -> (ChatService, Arc<InMemoryBookings>) {
        let backend = Arc::new(InMemoryBookings::new());
        let service = ChatService::new(
            Arc::new(KeywordExtractor::new()),
            backend.clone(),
            300,
            Language::En,
        );
        (service, backend)
    }

    #[tokio::test]
    async fn book_then_affirm_creates_booking() {
        let (service, backend) = service_with_backend();

        let reply = service
            .handle_message(
                "s1",
                "book a cleaning service for tomorrow at 10am",
                Some("user-1".into()),
            )
            .await;
        let pending = reply.pending_confirmation.expect("token should be issued");
        assert_eq!(pending.action_kind, ActionKind::Book);

        let reply = service.handle_message("s1", "yes", None).await;
        assert!(reply.reply.contains("confirmed"), "got: {}", reply.reply);
        assert_eq!(backend.booking_count().await, 1);
        assert!(service.store().get("s1").await.is_none());
    }

    #[tokio::test]
    async fn incomplete_book_asks_for_when_without_token() {
        let (service, _) = service_with_backend();
        let reply = service
            .handle_message("s1", "book a cleaning service", Some("user-1".into()))
            .await;
        assert!(reply.pending_confirmation.is_none());
        assert!(reply.reply.contains("date and time"), "got: {}", reply.reply);
    }

    #[tokio::test]
    async fn cancel_with_two_bookings_asks_which() {
        let (service, _) = service_with_backend();
        for id in ["1", "2"] {
            service
                .add_active_booking(
                    "s1",
                    BookingRef {
                        booking_id: id.into(),
                        service_name: "cleaning".into(),
                    },
                )
                .await;
        }

        let reply = service
            .handle_message("s1", "cancel", Some("user-1".into()))
            .await;
        assert!(reply.pending_confirmation.is_none());
        assert!(reply.reply.contains("Which booking"), "got: {}", reply.reply);
    }

    #[tokio::test]
    async fn reject_discards_proposal_without_side_effect() {
        let (service, backend) = service_with_backend();
        backend.seed_booking("42", "user-1", "svc-cleaning").await;

        service
            .handle_message("s1", "cancel booking 42", Some("user-1".into()))
            .await;
        let reply = service.handle_message("s1", "no", None).await;
        assert!(reply.reply.contains("won't"), "got: {}", reply.reply);
        assert!(backend.is_active("42").await);
        assert!(service.store().get("s1").await.is_none());
    }

    #[tokio::test]
    async fn supersession_runs_only_the_new_action() {
        let (service, backend) = service_with_backend();
        backend.seed_booking("42", "user-1", "svc-cleaning").await;

        service
            .handle_message("s1", "cancel booking 42", Some("user-1".into()))
            .await;
        service
            .handle_message("s1", "book a cleaning service for friday at 9am", None)
            .await;
        let reply = service.handle_message("s1", "yes", None).await;

        assert!(reply.reply.contains("confirmed"), "got: {}", reply.reply);
        // Booking 42 was never cancelled; a new booking exists alongside it
        assert!(backend.is_active("42").await);
        assert_eq!(backend.booking_count().await, 2);
    }

    #[tokio::test]
    async fn expired_confirmation_instructs_to_restate() {
        let backend = Arc::new(InMemoryBookings::new());
        let service = ChatService::new(
            Arc::new(KeywordExtractor::new()),
            backend.clone(),
            0,
            Language::En,
        );

        service
            .handle_message(
                "s1",
                "book a cleaning service for tomorrow at 10am",
                Some("user-1".into()),
            )
            .await;
        let reply = service.handle_message("s1", "yes", None).await;
        assert!(
            reply.reply.contains("no longer valid"),
            "got: {}",
            reply.reply
        );
        assert_eq!(backend.booking_count().await, 0);
    }

    #[tokio::test]
    async fn unrelated_message_keeps_pending_usable() {
        let (service, backend) = service_with_backend();

        service
            .handle_message(
                "s1",
                "book a cleaning service for tomorrow at 10am",
                Some("user-1".into()),
            )
            .await;
        let reply = service
            .handle_message("s1", "how long does it usually take?", None)
            .await;
        assert!(service.store().get("s1").await.is_some());
        assert!(reply.pending_confirmation.is_none());

        let reply = service.handle_message("s1", "yes", None).await;
        assert!(reply.reply.contains("confirmed"), "got: {}", reply.reply);
        assert_eq!(backend.booking_count().await, 1);
    }

    #[tokio::test]
    async fn service_inferred_from_prior_context() {
        let (service, _) = service_with_backend();
        service
            .set_last_service(
                "s1",
                ServiceRef {
                    service_id: "svc-77".into(),
                    name: "cleaning".into(),
                    supports_earliest: false,
                },
            )
            .await;

        let reply = service
            .handle_message("s1", "book it for tomorrow at 10am", Some("user-1".into()))
            .await;
        let pending = reply.pending_confirmation.expect("token should be issued");
        assert_eq!(
            pending.parameters["service"]["service_id"],
            serde_json::json!("svc-77")
        );
    }

    #[tokio::test]
    async fn anonymous_affirm_requires_sign_in_but_keeps_token() {
        let (service, backend) = service_with_backend();

        let reply = service
            .handle_message("s1", "book a cleaning service for tomorrow at 10am", None)
            .await;
        assert!(reply.pending_confirmation.is_some());

        let reply = service.handle_message("s1", "yes", None).await;
        assert!(reply.reply.contains("sign in"), "got: {}", reply.reply);
        assert!(service.store().get("s1").await.is_some());
        assert_eq!(backend.booking_count().await, 0);

        // After signing in, the same pending confirmation succeeds
        let reply = service
            .handle_message("s1", "yes", Some("user-1".into()))
            .await;
        assert!(reply.reply.contains("confirmed"), "got: {}", reply.reply);
        assert_eq!(backend.booking_count().await, 1);
    }

    #[tokio::test]
    async fn arabic_flow_replies_in_arabic() {
        let (service, backend) = service_with_backend();

        let reply = service
            .handle_message("s1", "احجز خدمة تنظيف غدا 10am", Some("user-1".into()))
            .await;
        let pending = reply.pending_confirmation.expect("token should be issued");
        assert!(pending.prompt.contains("نعم"), "got: {}", pending.prompt);

        let reply = service.handle_message("s1", "نعم", None).await;
        assert!(reply.reply.contains("مؤكد"), "got: {}", reply.reply);
        assert_eq!(backend.booking_count().await, 1);
    }

    #[tokio::test]
    async fn outcome_is_recorded_from_the_executed_proposal() {
        let (service, backend) = service_with_backend();
        backend.seed_booking("42", "user-1", "svc-cleaning").await;
        service
            .add_active_booking(
                "s1",
                BookingRef {
                    booking_id: "42".into(),
                    service_name: "cleaning".into(),
                },
            )
            .await;

        // The pending cancel for 42 is superseded by a book before any answer
        service
            .handle_message("s1", "cancel booking 42", Some("user-1".into()))
            .await;
        service
            .handle_message("s1", "book a plumbing service for friday at 9am", None)
            .await;

        let reply = service.handle_message("s1", "yes", None).await;
        assert!(reply.reply.contains("confirmed"), "got: {}", reply.reply);

        // The context reflects the executed book, not the superseded cancel
        let ctx = service.session("s1").await.unwrap();
        assert!(ctx.active_bookings.iter().any(|b| b.booking_id == "42"));
        let added = ctx
            .active_bookings
            .iter()
            .find(|b| b.service_name == "plumbing")
            .expect("executed booking recorded");
        assert!(added.booking_id.starts_with("bk-"));
    }

    #[tokio::test]
    async fn unsupported_intent_is_declined_politely() {
        let (service, _) = service_with_backend();
        let reply = service
            .handle_message("s1", "reschedule my booking to friday", Some("u".into()))
            .await;
        assert!(reply.pending_confirmation.is_none());
        assert!(reply.reply.contains("can't do that"), "got: {}", reply.reply);
    }

    #[tokio::test]
    async fn no_intent_yields_help_text() {
        let (service, _) = service_with_backend();
        let reply = service
            .handle_message("s1", "hello there", Some("u".into()))
            .await;
        assert!(reply.pending_confirmation.is_none());
        assert!(reply.reply.contains("book or cancel"), "got: {}", reply.reply);
    }
}
