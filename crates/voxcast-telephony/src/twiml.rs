//! Call-time script documents.
//!
//! The provider fetches one of these XML documents when the callee picks
//! up: a spoken disclaimer, a single-digit opt-out gather, the campaign
//! audio, and a hangup. Generation never fails — any upstream problem
//! degrades to [`error_document`] so the callee hears a polite close
//! instead of silence.

/// Prompt spoken inside the opt-out gather.
const OPT_OUT_PROMPT: &str = "Press 9 to stop receiving these calls.";

/// Seconds the gather waits for a digit before playback continues.
const GATHER_TIMEOUT_SECS: u32 = 3;

fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// The standard call script: disclaimer, opt-out gather, playback, hangup.
pub fn script_document(audio_url: &str, disclaimer: &str, keypress_url: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <Response>\n\
           <Say>{disclaimer}</Say>\n\
           <Gather numDigits=\"1\" timeout=\"{GATHER_TIMEOUT_SECS}\" action=\"{action}\" method=\"POST\">\n\
             <Say>{prompt}</Say>\n\
           </Gather>\n\
           <Play>{audio}</Play>\n\
           <Hangup/>\n\
         </Response>\n",
        disclaimer = xml_escape(disclaimer),
        action = xml_escape(keypress_url),
        prompt = OPT_OUT_PROMPT,
        audio = xml_escape(audio_url),
    )
}

/// Fallback when script inputs are missing or malformed: a short spoken
/// message, never silence.
pub fn error_document() -> String {
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
     <Response>\n\
       <Say>We are sorry, this message is unavailable right now. Goodbye.</Say>\n\
       <Hangup/>\n\
     </Response>\n"
        .to_string()
}

/// Response after a successful opt-out keypress.
pub fn keypress_confirm_document() -> String {
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
     <Response>\n\
       <Say>You have been removed from this call list. Goodbye.</Say>\n\
       <Hangup/>\n\
     </Response>\n"
        .to_string()
}

/// Response to any digit other than the opt-out digit.
pub fn keypress_invalid_document() -> String {
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
     <Response>\n\
       <Say>Invalid option. Goodbye.</Say>\n\
       <Hangup/>\n\
     </Response>\n"
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_contains_all_four_verbs_in_order() {
        let doc = script_document(
            "https://cdn.example.com/a.mp3",
            "This is an automated call.",
            "https://host/broadcast/keypress",
        );

        let say = doc.find("<Say>This is an automated call.</Say>").unwrap();
        let gather = doc.find("<Gather").unwrap();
        let play = doc.find("<Play>https://cdn.example.com/a.mp3</Play>").unwrap();
        let hangup = doc.find("<Hangup/>").unwrap();
        assert!(say < gather && gather < play && play < hangup);

        assert!(doc.contains("numDigits=\"1\""));
        assert!(doc.contains("timeout=\"3\""));
        assert!(doc.contains("action=\"https://host/broadcast/keypress\""));
        assert!(doc.contains("Press 9 to stop receiving these calls."));
    }

    #[test]
    fn script_escapes_xml_metacharacters() {
        let doc = script_document(
            "https://cdn.example.com/a.mp3?x=1&y=2",
            "Tom & Jerry's <call>",
            "https://host/keypress",
        );
        assert!(doc.contains("Tom &amp; Jerry&apos;s &lt;call&gt;"));
        assert!(doc.contains("a.mp3?x=1&amp;y=2"));
    }

    #[test]
    fn fallback_documents_speak_then_hang_up() {
        for doc in [
            error_document(),
            keypress_confirm_document(),
            keypress_invalid_document(),
        ] {
            assert!(doc.contains("<Say>"));
            assert!(doc.contains("<Hangup/>"));
            assert!(!doc.contains("<Play>"));
        }
        assert!(keypress_confirm_document().contains("removed from this call list"));
        assert!(keypress_invalid_document().contains("Invalid option"));
    }
}
