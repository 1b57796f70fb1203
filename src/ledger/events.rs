//! Events emitted by the ledger engine after each commit.

use pitboss_proto::{
    AlertKind, ParticipantId, ParticipantRecord, ServerMessage, SessionId, SessionRecord,
    SettlementLine, TopUpRequest, TopUpStatus, Transaction,
};
use serde_json::json;

/// One committed ledger change.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEvent {
    SessionCreated {
        session: SessionRecord,
    },
    SessionStatusChanged {
        session: SessionRecord,
        settlement: Vec<SettlementLine>,
    },
    TransactionRecorded {
        transaction: Transaction,
        participant: ParticipantRecord,
    },
    ParticipantsInvited {
        session_id: SessionId,
        participants: Vec<ParticipantRecord>,
    },
    ParticipantUpdated {
        participant: ParticipantRecord,
    },
    TopUpRequested {
        operator_id: ParticipantId,
        request: TopUpRequest,
    },
    TopUpResolved {
        request: TopUpRequest,
        contribution: Option<(Transaction, ParticipantRecord)>,
    },
}

/// Receives events in commit order, per session.
///
/// `publish` is called while the engine still holds the session's critical
/// section, so implementations must not block or await.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: LedgerEvent);
}

/// Sink that drops every event.
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: LedgerEvent) {}
}

impl LedgerEvent {
    pub fn session_id(&self) -> SessionId {
        match self {
            Self::SessionCreated { session } | Self::SessionStatusChanged { session, .. } => {
                session.id
            }
            Self::TransactionRecorded { transaction, .. } => transaction.session_id,
            Self::ParticipantsInvited { session_id, .. } => *session_id,
            Self::ParticipantUpdated { participant } => participant.session_id,
            Self::TopUpRequested { request, .. } | Self::TopUpResolved { request, .. } => {
                request.session_id
            }
        }
    }

    /// Short name for logging and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionCreated { .. } => "session_created",
            Self::SessionStatusChanged { .. } => "session_status_changed",
            Self::TransactionRecorded { .. } => "transaction_recorded",
            Self::ParticipantsInvited { .. } => "participants_invited",
            Self::ParticipantUpdated { .. } => "participant_updated",
            Self::TopUpRequested { .. } => "top_up_requested",
            Self::TopUpResolved { .. } => "top_up_resolved",
        }
    }

    /// Frames broadcast to the session's room, in order.
    pub fn room_messages(&self) -> Vec<ServerMessage> {
        let session_id = self.session_id();
        match self {
            Self::SessionCreated { session } => vec![ServerMessage::SessionStatusChanged {
                session_id,
                status: session.status,
                extra: None,
            }],
            Self::SessionStatusChanged {
                session,
                settlement,
            } => {
                let extra = if settlement.is_empty() {
                    json!({
                        "started_at": session.started_at,
                        "ended_at": session.ended_at,
                    })
                } else {
                    json!({
                        "started_at": session.started_at,
                        "ended_at": session.ended_at,
                        "settlement": settlement,
                    })
                };
                vec![ServerMessage::SessionStatusChanged {
                    session_id,
                    status: session.status,
                    extra: Some(extra),
                }]
            }
            Self::TransactionRecorded {
                transaction,
                participant,
            } => vec![ServerMessage::LedgerEvent {
                session_id,
                transaction: transaction.clone(),
                participant: participant.clone(),
            }],
            Self::ParticipantsInvited { participants, .. } => {
                vec![ServerMessage::ParticipantsInvited {
                    session_id,
                    participants: participants.clone(),
                }]
            }
            Self::ParticipantUpdated { participant } => vec![ServerMessage::ParticipantUpdated {
                session_id,
                participant: participant.clone(),
            }],
            Self::TopUpRequested { request, .. } => vec![ServerMessage::TopUpRequested {
                session_id,
                request: request.clone(),
            }],
            Self::TopUpResolved {
                request,
                contribution,
            } => {
                let mut out = Vec::with_capacity(2);
                if let Some((transaction, participant)) = contribution {
                    out.push(ServerMessage::LedgerEvent {
                        session_id,
                        transaction: transaction.clone(),
                        participant: participant.clone(),
                    });
                }
                out.push(ServerMessage::TopUpResolved {
                    session_id,
                    request: request.clone(),
                });
                out
            }
        }
    }

    /// Alerts addressed to individual participants on every device.
    pub fn direct_alerts(&self) -> Vec<(ParticipantId, ServerMessage)> {
        let session_id = self.session_id();
        match self {
            Self::ParticipantsInvited { participants, .. } => participants
                .iter()
                .map(|p| {
                    (
                        p.participant_id,
                        ServerMessage::DirectAlert {
                            kind: AlertKind::Invitation,
                            payload: json!({ "session_id": session_id }),
                        },
                    )
                })
                .collect(),
            Self::TopUpRequested {
                operator_id,
                request,
            } => vec![(
                *operator_id,
                ServerMessage::DirectAlert {
                    kind: AlertKind::TopUpRequested,
                    payload: json!({
                        "session_id": session_id,
                        "request_id": request.id,
                        "participant_id": request.participant_id,
                        "amount": request.amount,
                    }),
                },
            )],
            Self::TopUpResolved { request, .. } => vec![(
                request.participant_id,
                ServerMessage::DirectAlert {
                    kind: AlertKind::TopUpResolved,
                    payload: json!({
                        "session_id": session_id,
                        "request_id": request.id,
                        "approved": request.status == TopUpStatus::Approved,
                        "amount": request.amount,
                    }),
                },
            )],
            _ => Vec::new(),
        }
    }
}
