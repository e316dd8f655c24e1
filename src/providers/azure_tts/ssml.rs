//! SSML body and output-format names

/// Azure identifier for a short format name; unknown names pass through.
pub fn output_format(name: &str) -> &str {
    match name.to_ascii_lowercase().as_str() {
        "mp3" => "audio-24khz-48kbitrate-mono-mp3",
        "wav" => "riff-24khz-16bit-mono-pcm",
        "opus" => "ogg-24khz-16bit-mono-opus",
        "pcm" => "raw-24khz-16bit-mono-pcm",
        _ => name,
    }
}

/// Wrap `text` in a single-voice `<speak>` document.
pub fn build_ssml(text: &str, voice: &str) -> String {
    format!(
        "<speak version='1.0' xmlns='http://www.w3.org/2001/10/synthesis' xml:lang='{lang}'>\
         <voice name='{voice}'>{text}</voice></speak>",
        lang = escape_xml(voice_locale(voice)),
        voice = escape_xml(voice),
        text = escape_xml(text),
    )
}

/// `en-US` from `en-US-AvaMultilingualNeural`.
fn voice_locale(voice: &str) -> &str {
    let mut dashes = voice.match_indices('-').map(|(i, _)| i);
    match (dashes.next(), dashes.next()) {
        (Some(_), Some(end)) => &voice[..end],
        _ => "en-US",
    }
}

fn escape_xml(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssml_escapes_text_and_derives_locale() {
        let ssml = build_ssml("Tom & <Jerry>", "de-DE-KatjaNeural");
        assert_eq!(
            ssml,
            "<speak version='1.0' xmlns='http://www.w3.org/2001/10/synthesis' xml:lang='de-DE'>\
             <voice name='de-DE-KatjaNeural'>Tom &amp; &lt;Jerry&gt;</voice></speak>"
        );
    }

    #[test]
    fn short_format_names_are_mapped() {
        assert_eq!(output_format("mp3"), "audio-24khz-48kbitrate-mono-mp3");
        assert_eq!(output_format("WAV"), "riff-24khz-16bit-mono-pcm");
        assert_eq!(
            output_format("audio-16khz-32kbitrate-mono-mp3"),
            "audio-16khz-32kbitrate-mono-mp3"
        );
    }

    #[test]
    fn unusual_voice_names_fall_back_to_en_us() {
        assert_eq!(voice_locale("custom"), "en-US");
    }
}
