//! Call agent - the tools the conversation can invoke on a live call

use crate::application::orchestrator::CallControl;
use crate::domain::call::{CallPhase, CallSession, DialInfo, TerminalReason};
use crate::domain::conversation::{ConversationEngine, EngineError, ToolOutput};
use crate::domain::gateway::DialClient;
use crate::domain::scheduling::{AppointmentConfirmation, AvailabilityProvider};
use crate::domain::shared::error::CallError;
use crate::domain::shared::value_objects::{tel_uri, ParticipantIdentity};
use serde_json::json;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

const TRANSFER_NOTICE: &str = "let the user know you'll be transferring them";
const TRANSFER_APOLOGY: &str = "there was an error transferring the call.";

/// Scheduling assistant driving one outbound call.
///
/// The agent owns no concurrency: the engine dispatches one tool at a time
/// and anything that ends the call goes through [`CallControl`].
pub struct CallAgent {
    dial_info: DialInfo,
    control: CallControl,
    engine: Arc<dyn ConversationEngine>,
    dial: Arc<dyn DialClient>,
    availability: Arc<dyn AvailabilityProvider>,
    confirmation: Mutex<Option<AppointmentConfirmation>>,
}

impl CallAgent {
    pub fn new(
        dial_info: DialInfo,
        control: CallControl,
        engine: Arc<dyn ConversationEngine>,
        dial: Arc<dyn DialClient>,
        availability: Arc<dyn AvailabilityProvider>,
    ) -> Self {
        Self {
            dial_info,
            control,
            engine,
            dial,
            availability,
            confirmation: Mutex::new(None),
        }
    }

    pub fn dial_info(&self) -> &DialInfo {
        &self.dial_info
    }

    pub fn session(&self) -> &Arc<CallSession> {
        self.control.session()
    }

    /// Appointment the callee confirmed, if any
    pub fn confirmation(&self) -> Option<AppointmentConfirmation> {
        self.confirmation
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// System instructions for the conversation session
    pub fn instructions(&self) -> String {
        format!(
            "You are a scheduling assistant for a dental practice. \
             You will be on a call with a patient who has an upcoming appointment. \
             Your goal is to confirm the appointment details. \
             As a customer service representative, you will be polite and professional at all times. \
             Allow the user to end the conversation.\n\
             When the user would like to be transferred to a human agent, first confirm with them. \
             Upon confirmation, use the transfer_call tool.\n\
             The customer's name is {}. Their appointment is on {}.",
            self.dial_info.customer_name(),
            self.dial_info.appointment_time()
        )
    }

    /// Transfer the callee to a human agent
    pub async fn transfer_call(&self) -> ToolOutput {
        let participant = match self.require_active() {
            Ok(participant) => participant,
            Err(e) => return e.into(),
        };
        let Some(target) = self.dial_info.transfer_target() else {
            info!("Declining transfer for {}: no transfer target configured", participant);
            return CallError::ToolPrecondition("cannot transfer call".to_string()).into();
        };

        info!("Transferring call for {} to {}", participant, target);

        // The callee must hear the notice before the line is handed off
        if let Err(e) = self.say(TRANSFER_NOTICE).await {
            let error = CallError::Engine(e.to_string());
            error!("Transfer notice for {} was not played, not transferring: {}", participant, error);
            self.fail_call(&participant).await;
            return error.into();
        }
        if !self.session().is_active() {
            return ToolOutput::CallEnded;
        }

        let room = self.session().room();
        match self
            .dial
            .transfer_participant(room, &participant, &tel_uri(target))
            .await
        {
            Ok(()) => {
                info!("Transferred call for {} to {}", participant, target);
                self.control.teardown(TerminalReason::Transferred).await;
                ToolOutput::ok("call transferred")
            }
            Err(e) => {
                let error = CallError::Transfer(e);
                error!("Error transferring call for {}: {}", participant, error);
                self.fail_call(&participant).await;
                error.into()
            }
        }
    }

    /// End the call once the agent finishes speaking
    pub async fn end_call(&self) -> ToolOutput {
        let participant = match self.require_active() {
            Ok(participant) => participant,
            Err(e) => return e.into(),
        };
        info!("Ending the call for {}", participant);

        if let Some(speech) = self.engine.current_speech().await {
            speech.wait_for_playout().await;
        }

        self.control.teardown(TerminalReason::UserEnded).await;
        ToolOutput::ok("call ended")
    }

    /// Look up alternative appointment times
    pub async fn look_up_availability(&self, date: &str) -> ToolOutput {
        let participant = match self.require_active() {
            Ok(participant) => participant,
            Err(e) => return e.into(),
        };
        info!("Looking up availability for {} on {}", participant, date);

        match self.availability.available_times(date).await {
            Ok(times) => ToolOutput::Data {
                data: json!({ "available_times": times }),
            },
            Err(e) => {
                warn!("Availability lookup for {} failed: {}", date, e);
                ToolOutput::failed(e.to_string())
            }
        }
    }

    /// Record the callee's confirmation of an appointment slot
    pub async fn confirm_appointment(&self, date: &str, time: &str) -> ToolOutput {
        let participant = match self.require_active() {
            Ok(participant) => participant,
            Err(e) => return e.into(),
        };
        info!(
            "Confirming appointment for {} on {} at {}",
            participant, date, time
        );

        let mut slot = self
            .confirmation
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let already_confirmed = slot
            .as_ref()
            .is_some_and(|confirmed| confirmed.is_same_slot(date, time));
        if !already_confirmed {
            *slot = Some(AppointmentConfirmation::new(date, time));
        }

        ToolOutput::ok("reservation confirmed")
    }

    /// Hang up on an answering machine without a closing remark
    pub async fn detected_answering_machine(&self) -> ToolOutput {
        let participant = match self.require_active() {
            Ok(participant) => participant,
            Err(e) => return e.into(),
        };
        info!("Detected answering machine for {}", participant);

        self.control.teardown(TerminalReason::VoicemailDetected).await;
        ToolOutput::ok("call ended")
    }

    /// The bound callee, or why tools may not act on the call
    fn require_active(&self) -> Result<ParticipantIdentity, CallError> {
        let session = self.session();
        match session.phase() {
            CallPhase::Terminal(reason) => Err(CallError::CallEnded(reason.to_string())),
            CallPhase::Created => Err(CallError::NotConnected),
            CallPhase::Active => session
                .participant()
                .cloned()
                .ok_or(CallError::NotConnected),
        }
    }

    /// Speak and wait for the utterance to finish playing
    async fn say(&self, instructions: &str) -> Result<(), EngineError> {
        let speech = self.engine.generate_reply(instructions).await?;
        speech.wait_for_playout().await;
        Ok(())
    }

    /// Apologize if the engine still can, then force the call down
    async fn fail_call(&self, participant: &ParticipantIdentity) {
        if let Err(e) = self.say(TRANSFER_APOLOGY).await {
            warn!("Apology for {} was not played: {}", participant, e);
        }
        self.control.teardown(TerminalReason::DialFailed).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::conversation::{SessionOptions, SpeechHandle, ToolDispatcher};
    use crate::domain::gateway::{DialError, MockDialClient};
    use crate::domain::shared::value_objects::RoomName;
    use crate::infrastructure::scheduling::StaticAvailability;
    use async_trait::async_trait;

    #[derive(Default)]
    struct RecordingEngine {
        replies: Mutex<Vec<String>>,
        speech_fails: bool,
    }

    impl RecordingEngine {
        fn without_speech() -> Self {
            Self {
                speech_fails: true,
                ..Default::default()
            }
        }

        fn replies(&self) -> Vec<String> {
            self.replies.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ConversationEngine for RecordingEngine {
        async fn start_session(
            &self,
            _room: &RoomName,
            _tools: Arc<dyn ToolDispatcher>,
            _options: &SessionOptions,
        ) -> Result<(), EngineError> {
            Ok(())
        }

        async fn generate_reply(&self, instructions: &str) -> Result<SpeechHandle, EngineError> {
            self.replies.lock().unwrap().push(instructions.to_string());
            if self.speech_fails {
                return Err(EngineError::Speech("synthesis unavailable".to_string()));
            }
            Ok(SpeechHandle::finished(instructions))
        }

        async fn current_speech(&self) -> Option<SpeechHandle> {
            None
        }

        async fn close(&self) {}
    }

    fn agent_with(
        dial_info: DialInfo,
        dial: MockDialClient,
        engine: Arc<RecordingEngine>,
    ) -> CallAgent {
        let dial: Arc<dyn DialClient> = Arc::new(dial);
        let session = Arc::new(CallSession::new(RoomName::new("room-t")));
        let control = CallControl::new(session, dial.clone(), engine.clone());
        CallAgent::new(
            dial_info,
            control,
            engine,
            dial,
            Arc::new(StaticAvailability::default()),
        )
    }

    fn bind(agent: &CallAgent) {
        agent
            .session()
            .bind_participant(ParticipantIdentity::new("+15551230000"))
            .unwrap();
    }

    #[tokio::test]
    async fn test_tools_fail_fast_before_binding() {
        let mut dial = MockDialClient::new();
        dial.expect_transfer_participant().never();
        dial.expect_terminate_session().never();
        let agent = agent_with(
            DialInfo::new("+15551230000", "+15559998888"),
            dial,
            Arc::new(RecordingEngine::default()),
        );

        assert_eq!(agent.transfer_call().await, ToolOutput::NotConnected);
        assert_eq!(agent.end_call().await, ToolOutput::NotConnected);
        assert_eq!(agent.detected_answering_machine().await, ToolOutput::NotConnected);
        assert_eq!(agent.session().phase(), CallPhase::Created);
    }

    #[tokio::test]
    async fn test_transfer_without_target_is_declined() {
        let mut dial = MockDialClient::new();
        dial.expect_transfer_participant().never();
        dial.expect_terminate_session().never();
        let engine = Arc::new(RecordingEngine::default());
        let agent = agent_with(DialInfo::new("+15551230000", ""), dial, engine.clone());
        bind(&agent);

        let output = agent.transfer_call().await;

        assert_eq!(output, ToolOutput::declined("cannot transfer call"));
        assert_eq!(agent.session().phase(), CallPhase::Active);
        assert!(engine.replies().is_empty());
    }

    #[tokio::test]
    async fn test_transfer_sends_tel_uri_after_notice() {
        let mut dial = MockDialClient::new();
        dial.expect_transfer_participant()
            .withf(|room, participant, destination| {
                room.as_str() == "room-t"
                    && participant.as_str() == "+15551230000"
                    && destination.to_string() == "tel:+15559998888"
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        dial.expect_terminate_session().times(1).return_const(());
        let engine = Arc::new(RecordingEngine::default());
        let agent = agent_with(
            DialInfo::new("+15551230000", "+15559998888"),
            dial,
            engine.clone(),
        );
        bind(&agent);

        let output = agent.transfer_call().await;

        assert_eq!(output, ToolOutput::ok("call transferred"));
        assert_eq!(engine.replies(), vec![TRANSFER_NOTICE.to_string()]);
        assert_eq!(
            agent.session().phase(),
            CallPhase::Terminal(TerminalReason::Transferred)
        );
    }

    #[tokio::test]
    async fn test_failed_transfer_apologizes_then_tears_down() {
        let mut dial = MockDialClient::new();
        dial.expect_transfer_participant().times(1).returning(|_, _, _| {
            Err(DialError::Rejected {
                status_code: 403,
                reason: "Forbidden".to_string(),
            })
        });
        dial.expect_terminate_session().times(1).return_const(());
        let engine = Arc::new(RecordingEngine::default());
        let agent = agent_with(
            DialInfo::new("+15551230000", "+15559998888"),
            dial,
            engine.clone(),
        );
        bind(&agent);

        let output = agent.transfer_call().await;

        assert!(matches!(output, ToolOutput::Failed { .. }));
        assert_eq!(
            engine.replies(),
            vec![TRANSFER_NOTICE.to_string(), TRANSFER_APOLOGY.to_string()]
        );
        assert_eq!(
            agent.session().terminal_reason(),
            Some(TerminalReason::DialFailed)
        );
    }

    #[tokio::test]
    async fn test_unplayed_notice_blocks_transfer() {
        let mut dial = MockDialClient::new();
        dial.expect_transfer_participant().never();
        dial.expect_terminate_session().times(1).return_const(());
        let engine = Arc::new(RecordingEngine::without_speech());
        let agent = agent_with(
            DialInfo::new("+15551230000", "+15559998888"),
            dial,
            engine.clone(),
        );
        bind(&agent);

        let output = agent.transfer_call().await;

        assert!(matches!(output, ToolOutput::Failed { .. }));
        assert_eq!(engine.replies()[0], TRANSFER_NOTICE);
        assert_eq!(
            agent.session().terminal_reason(),
            Some(TerminalReason::DialFailed)
        );
    }

    #[tokio::test]
    async fn test_voicemail_hangs_up_silently() {
        let mut dial = MockDialClient::new();
        dial.expect_terminate_session().times(1).return_const(());
        let engine = Arc::new(RecordingEngine::default());
        let agent = agent_with(
            DialInfo::new("+15551230000", "+15559998888"),
            dial,
            engine.clone(),
        );
        bind(&agent);

        agent.detected_answering_machine().await;

        assert!(engine.replies().is_empty());
        assert_eq!(
            agent.session().terminal_reason(),
            Some(TerminalReason::VoicemailDetected)
        );
        // Anything after the hangup is rejected
        assert_eq!(agent.end_call().await, ToolOutput::CallEnded);
        assert_eq!(
            agent.confirm_appointment("Tuesday", "3pm").await,
            ToolOutput::CallEnded
        );
    }

    #[tokio::test]
    async fn test_confirm_appointment_is_idempotent() {
        let mut dial = MockDialClient::new();
        dial.expect_terminate_session().never();
        let agent = agent_with(
            DialInfo::new("+15551230000", "+15559998888"),
            dial,
            Arc::new(RecordingEngine::default()),
        );
        bind(&agent);

        assert_eq!(
            agent.confirm_appointment("Tuesday", "3pm").await,
            ToolOutput::ok("reservation confirmed")
        );
        let first = agent.confirmation().unwrap();
        assert_eq!(
            agent.confirm_appointment("Tuesday", "3pm").await,
            ToolOutput::ok("reservation confirmed")
        );
        assert_eq!(agent.confirmation().unwrap(), first);

        agent.confirm_appointment("Wednesday", "1pm").await;
        assert!(agent.confirmation().unwrap().is_same_slot("Wednesday", "1pm"));
        assert_eq!(agent.session().phase(), CallPhase::Active);
    }

    #[tokio::test]
    async fn test_look_up_availability() {
        let mut dial = MockDialClient::new();
        dial.expect_terminate_session().never();
        let agent = agent_with(
            DialInfo::new("+15551230000", "+15559998888"),
            dial,
            Arc::new(RecordingEngine::default()),
        );
        bind(&agent);

        let output = agent.look_up_availability("Tuesday").await;
        assert_eq!(
            output,
            ToolOutput::Data {
                data: json!({ "available_times": ["1pm", "2pm", "3pm"] })
            }
        );
    }

    #[test]
    fn test_instructions_mention_customer() {
        let agent = agent_with(
            DialInfo::new("+15551230000", "")
                .with_context("customer_name", "Ravi")
                .with_context("appointment_time", "next Tuesday at 3pm"),
            MockDialClient::new(),
            Arc::new(RecordingEngine::default()),
        );

        let instructions = agent.instructions();
        assert!(instructions.contains("The customer's name is Ravi."));
        assert!(instructions.contains("next Tuesday at 3pm"));
        assert!(instructions.contains("transfer_call"));
    }
}
