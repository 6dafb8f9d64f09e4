use std::sync::Arc;

use crate::db::queries;
use crate::models::{Booking, ChatResponse, Conversation, RouteTarget, User};
use crate::services::actions::{self, GENERIC_APOLOGY};
use crate::services::rules::BookingDeps;
use crate::state::AppState;

/// Runs one conversation turn: classify, route, handle, append history.
/// Single pass; multi-turn continuity lives entirely in the conversation's
/// message history. Extraction failures get exactly one fallback to the
/// general path before degrading to a generic error.
pub async fn handle_turn(
    state: &Arc<AppState>,
    user: &User,
    conversation: &mut Conversation,
    message: &str,
    deps: &BookingDeps,
) -> anyhow::Result<ChatResponse> {
    let bookings = {
        let db = state.db.lock().unwrap();
        queries::list_bookings_for_user(&db, user.id)?
    };
    let context = build_context(deps, &bookings, message);

    // History snapshot for extraction grounding; this turn's messages are
    // appended only at the end.
    let history = conversation.messages.clone();

    let response = match state.extractor.classify(&context, &history).await {
        Ok(decision) => {
            tracing::info!(
                user_id = user.id,
                target = ?decision.target,
                confidence = decision.confidence,
                "routing decision"
            );

            match decision.target {
                RouteTarget::Booking => {
                    match state.extractor.extract_booking_action(&context, &history).await {
                        Ok(outcome) if outcome.success => match outcome.action {
                            Some(action) => {
                                let db = state.db.lock().unwrap();
                                actions::dispatch_action(&db, &action, user, deps)?
                            }
                            None => {
                                actions::handle_general_inquiry(
                                    state.extractor.as_ref(),
                                    &context,
                                    &history,
                                )
                                .await
                            }
                        },
                        Ok(outcome) => {
                            tracing::debug!(
                                user_id = user.id,
                                note = outcome.message.as_deref().unwrap_or(""),
                                "no recognizable booking action, falling back to general"
                            );
                            actions::handle_general_inquiry(
                                state.extractor.as_ref(),
                                &context,
                                &history,
                            )
                            .await
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, user_id = user.id, "booking extraction failed, falling back to general");
                            actions::handle_general_inquiry(
                                state.extractor.as_ref(),
                                &context,
                                &history,
                            )
                            .await
                        }
                    }
                }
                RouteTarget::General => {
                    actions::handle_general_inquiry(state.extractor.as_ref(), &context, &history)
                        .await
                }
                RouteTarget::Clarification => actions::handle_clarification(&decision),
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, user_id = user.id, "routing classification failed, falling back to general");
            actions::handle_general_inquiry(state.extractor.as_ref(), &context, &history).await
        }
    };

    if matches!(&response, ChatResponse::Error { message } if message == GENERIC_APOLOGY) {
        tracing::warn!(user_id = user.id, "turn degraded to generic error");
    }

    conversation.record_turn(message, &response.display_text(), deps.now);
    Ok(response)
}

fn build_context(deps: &BookingDeps, bookings: &[Booking], message: &str) -> String {
    let bookings_info = bookings
        .iter()
        .map(|b| {
            format!(
                "{{id: {}, service: {}, technician: {}, datetime: {}}}",
                b.id,
                b.service,
                b.technician_name,
                b.format_datetime()
            )
        })
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Current date and time is: {}\nBusiness hours: {} - {}\nUser's bookings: [{}]\nUser request: {}",
        deps.now.format("%Y-%m-%d %H:%M:%S"),
        deps.open,
        deps.close,
        bookings_info,
        message
    )
}
