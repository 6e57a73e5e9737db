use nupi_adapter_core::protocol::ResolveIntentRequest;
use std::fmt::Write;

use crate::language::resolve_language_instruction;

/// Used when the caller supplies no system prompt of its own.
pub fn build_fallback_system_prompt(request: &ResolveIntentRequest) -> String {
    let sessions = if request.available_sessions.is_empty() {
        "No active sessions".to_string()
    } else {
        let mut lines = String::new();
        for (i, s) in request.available_sessions.iter().enumerate() {
            if i > 0 {
                lines.push('\n');
            }
            let _ = write!(lines, "- {}: {} in {} ({})", s.id, s.command, s.work_dir, s.status);
        }
        lines
    };

    let session_id = if request.session_id.is_empty() {
        "none"
    } else {
        &request.session_id
    };
    let current_tool = if request.current_tool.is_empty() {
        "unknown"
    } else {
        &request.current_tool
    };

    format!(
        "You are a voice assistant for a terminal/IDE environment.\n\
         Your job is to interpret user voice commands and decide what action to take.\n\
         \n\
         Available sessions:\n\
         {sessions}\n\
         \n\
         Current session: {session_id}\n\
         Current tool: {current_tool}\n\
         \n\
         You must respond with one of these actions:\n\
         - command: Execute a shell command in a session\n\
         - speak: Speak a response to the user (no execution)\n\
         - clarify: Ask the user for more information\n\
         - noop: No action needed\n\
         \n\
         Always include reasoning and confidence (0-1) in your response."
    )
}

/// Caller prompt (or the fallback) plus the language directive, if any.
pub fn compose_system_prompt(request: &ResolveIntentRequest, configured_language: &str) -> String {
    let mut prompt = if request.system_prompt.is_empty() {
        build_fallback_system_prompt(request)
    } else {
        request.system_prompt.clone()
    };

    let instruction = resolve_language_instruction(configured_language, &request.metadata);
    if !instruction.is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(&instruction);
    }
    prompt
}

/// The caller's user prompt, or the raw transcript when none was supplied.
pub fn user_prompt(request: &ResolveIntentRequest) -> &str {
    if request.user_prompt.is_empty() {
        &request.transcript
    } else {
        &request.user_prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::LANGUAGE_METADATA_KEY;
    use nupi_adapter_core::protocol::SessionInfo;

    fn session(id: &str, command: &str, dir: &str, status: &str) -> SessionInfo {
        SessionInfo {
            id: id.to_string(),
            command: command.to_string(),
            work_dir: dir.to_string(),
            status: status.to_string(),
        }
    }

    #[test]
    fn test_fallback_without_sessions() {
        let prompt = build_fallback_system_prompt(&ResolveIntentRequest::default());
        assert!(prompt.starts_with("You are a voice assistant for a terminal/IDE environment.\n"));
        assert!(prompt.contains("Available sessions:\nNo active sessions\n\n"));
        assert!(prompt.contains("Current session: none\nCurrent tool: unknown\n"));
        assert!(prompt.contains("- clarify: Ask the user for more information\n"));
        assert!(prompt.ends_with("Always include reasoning and confidence (0-1) in your response."));
    }

    #[test]
    fn test_fallback_lists_sessions() {
        let request = ResolveIntentRequest {
            session_id: "s1".to_string(),
            current_tool: "claude".to_string(),
            available_sessions: vec![
                session("s1", "bash", "/home/me", "running"),
                session("s2", "vim", "/tmp", "idle"),
            ],
            ..Default::default()
        };
        let prompt = build_fallback_system_prompt(&request);
        assert!(prompt.contains(
            "Available sessions:\n- s1: bash in /home/me (running)\n- s2: vim in /tmp (idle)\n\n"
        ));
        assert!(prompt.contains("Current session: s1\nCurrent tool: claude\n"));
    }

    #[test]
    fn test_compose_prefers_caller_prompt() {
        let request = ResolveIntentRequest {
            system_prompt: "Custom prompt".to_string(),
            ..Default::default()
        };
        assert_eq!(compose_system_prompt(&request, "client"), "Custom prompt");
    }

    #[test]
    fn test_compose_appends_language() {
        let mut request = ResolveIntentRequest {
            system_prompt: "Custom prompt".to_string(),
            ..Default::default()
        };
        request
            .metadata
            .insert(LANGUAGE_METADATA_KEY.to_string(), "Polish".to_string());
        assert_eq!(
            compose_system_prompt(&request, "client"),
            "Custom prompt\n\nAlways respond in Polish."
        );
        assert_eq!(
            compose_system_prompt(&request, "de"),
            "Custom prompt\n\nAlways respond in German regardless of the input language."
        );
    }

    #[test]
    fn test_user_prompt_falls_back_to_transcript() {
        let mut request = ResolveIntentRequest {
            transcript: "list files".to_string(),
            ..Default::default()
        };
        assert_eq!(user_prompt(&request), "list files");
        request.user_prompt = "The user said: list files".to_string();
        assert_eq!(user_prompt(&request), "The user said: list files");
    }
}
