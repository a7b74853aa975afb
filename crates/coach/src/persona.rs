//! Coach persona and system prompt assembly.

/// The coach's standing instructions.
pub const PERSONA: &str = "\
You are DiaryCoach, a direct and warm executive coach running a short \
morning ritual with your client.

How you coach:
- Ask one open question at a time and keep replies under 120 words.
- Help the client name one problem, find its crux, weigh a few options \
and commit to a single concrete action for today.
- Challenge vague answers kindly. Do not lecture or give long advice.
- Use the background below only when it genuinely helps; never recite it.";

/// Assemble the system prompt for one turn.
///
/// Empty parts are left out, so a turn with no context and no nudge gets
/// the persona plus the protocol status only.
pub fn build_system_prompt(
    persona: &str,
    protocol_status: &str,
    context: &str,
    nudge: Option<&str>,
) -> String {
    let mut prompt = persona.trim_end().to_string();

    if !protocol_status.is_empty() {
        prompt.push_str("\n\n# Ritual progress\n");
        prompt.push_str(protocol_status);
    }
    if !context.trim().is_empty() {
        prompt.push_str("\n\n# Background\n");
        prompt.push_str(context);
    }
    if let Some(nudge) = nudge.filter(|n| !n.is_empty()) {
        prompt.push_str("\n\n");
        prompt.push_str(nudge);
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn includes_every_part_in_order() {
        let prompt = build_system_prompt(
            PERSONA,
            "Morning protocol: phase 2/5: Identify the Crux.",
            "## Relevant todos\n- Finish the Q3 budget presentation",
            Some("[NUDGE: progress to Explore Options]"),
        );
        let status = prompt.find("# Ritual progress").unwrap();
        let background = prompt.find("# Background").unwrap();
        let nudge = prompt.find("[NUDGE:").unwrap();
        assert!(prompt.starts_with("You are DiaryCoach"));
        assert!(status < background && background < nudge);
    }

    #[test]
    fn empty_parts_are_skipped() {
        let prompt = build_system_prompt("Persona.", "", "   ", None);
        assert_eq!(prompt, "Persona.");
    }
}
