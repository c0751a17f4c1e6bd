use super::command::{seconds, RenderCommand, ToolPaths};
use std::path::{Path, PathBuf};

/// Sample format every prepared voice segment is converted to, so segments
/// can be joined without re-encoding
const VOICE_SAMPLE_RATE: &str = "44100";
const VOICE_CHANNELS: &str = "2";

/// Builds the ffmpeg invocations of the assembly passes. Nothing here runs a
/// process.
pub struct VideoEncoder {
    ffmpeg: String,
}

impl VideoEncoder {
    pub fn new(tools: &ToolPaths) -> Self {
        Self {
            ffmpeg: tools.ffmpeg.clone(),
        }
    }

    fn command(&self) -> RenderCommand {
        RenderCommand::new(&self.ffmpeg).arg("-y")
    }

    /// Join uniform clips listed in a concat-demuxer file by stream copy
    pub fn concat_list(&self, list_file: &Path, output: &Path) -> RenderCommand {
        self.command()
            .args(["-f", "concat", "-safe", "0"])
            .input(list_file)
            .args(["-c", "copy", "-fflags", "+genpts"])
            .path(output)
    }

    /// Join clips through a transition filter graph
    pub fn concat_graph(
        &self,
        clips: &[PathBuf],
        graph: &str,
        output_label: &str,
        output: &Path,
    ) -> RenderCommand {
        clips
            .iter()
            .fold(self.command(), |cmd, clip| cmd.input(clip))
            .args(["-filter_complex", graph])
            .args(["-map".to_string(), format!("[{}]", output_label)])
            .args(["-c:v", "libx264", "-pix_fmt", "yuv420p", "-an"])
            .path(output)
    }

    /// Burn a drawtext chain into the video
    pub fn overlay(&self, input: &Path, filter: &str, output: &Path) -> RenderCommand {
        self.command()
            .input(input)
            .args(["-vf", filter])
            .args(["-c:v", "libx264", "-pix_fmt", "yuv420p", "-c:a", "copy"])
            .path(output)
    }

    /// Lay the voice under the video as its only audio track
    pub fn mux_voice(&self, video: &Path, voice: &Path, output: &Path) -> RenderCommand {
        self.command()
            .input(video)
            .input(voice)
            .args(["-c:v", "copy", "-c:a", "aac"])
            .args(["-map", "0:v:0", "-map", "1:a:0", "-shortest"])
            .path(output)
    }

    /// Loop background music for the whole video and mix it under the
    /// existing audio at `volume`
    pub fn mix_background(&self, video: &Path, music: &Path, volume: f64, output: &Path) -> RenderCommand {
        let graph = format!(
            "[1:a]volume={}[bgm];[0:a][bgm]amix=inputs=2:duration=first:dropout_transition=3[a]",
            volume
        );
        self.command()
            .input(video)
            .args(["-stream_loop", "-1"])
            .input(music)
            .args(["-filter_complex".to_string(), graph])
            .args(["-map", "0:v", "-map", "[a]"])
            .args(["-c:v", "copy", "-c:a", "aac", "-shortest"])
            .path(output)
    }

    /// Convert a voice file to the shared PCM format, optionally appending
    /// `pad` seconds of silence
    pub fn prepare_voice(&self, input: &Path, pad: Option<f64>, output: &Path) -> RenderCommand {
        let cmd = self.command().input(input);
        let cmd = match pad {
            Some(pad) if pad > 0.0 => cmd.args(["-af".to_string(), format!("apad=pad_dur={}", seconds(pad))]),
            _ => cmd,
        };
        cmd.args(["-ar", VOICE_SAMPLE_RATE, "-ac", VOICE_CHANNELS, "-c:a", "pcm_s16le"])
            .path(output)
    }

    /// Join prepared voice segments listed in a concat-demuxer file
    pub fn concat_audio(&self, list_file: &Path, output: &Path) -> RenderCommand {
        self.command()
            .args(["-f", "concat", "-safe", "0"])
            .input(list_file)
            .args(["-c", "copy"])
            .path(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder() -> VideoEncoder {
        VideoEncoder::new(&ToolPaths::default())
    }

    #[test]
    fn test_concat_list_stream_copies() {
        let cmd = encoder().concat_list(Path::new("/w/list.txt"), Path::new("/w/joined.mp4"));
        assert_eq!(
            cmd.to_string(),
            "ffmpeg -y -f concat -safe 0 -i /w/list.txt -c copy -fflags +genpts /w/joined.mp4"
        );
    }

    #[test]
    fn test_concat_graph_inputs_in_order() {
        let clips = vec![PathBuf::from("/w/a.mp4"), PathBuf::from("/w/b.mp4")];
        let cmd = encoder().concat_graph(&clips, "[0:v][1:v]xfade[video]", "video", Path::new("/w/j.mp4"));
        let args = cmd.arguments();
        assert_eq!(&args[1..5], &["-i", "/w/a.mp4", "-i", "/w/b.mp4"]);
        assert!(cmd.contains_pair("-map", "[video]"));
        assert_eq!(cmd.value_of("-filter_complex"), Some("[0:v][1:v]xfade[video]"));
    }

    #[test]
    fn test_mux_voice_maps_first_streams() {
        let cmd = encoder().mux_voice(Path::new("v.mp4"), Path::new("a.wav"), Path::new("o.mp4"));
        assert!(cmd.contains_pair("-map", "0:v:0"));
        assert!(cmd.contains_pair("-map", "1:a:0"));
        assert!(cmd.contains_pair("-c:v", "copy"));
        assert!(cmd.arguments().contains(&"-shortest".to_string()));
    }

    #[test]
    fn test_background_music_loops_input() {
        let cmd = encoder().mix_background(Path::new("v.mp4"), Path::new("m.mp3"), 0.2, Path::new("o.mp4"));
        assert!(cmd.contains_pair("-stream_loop", "-1"));
        let graph = cmd.value_of("-filter_complex").unwrap();
        assert!(graph.contains("volume=0.2"));
        assert!(graph.contains("amix=inputs=2:duration=first"));
        assert!(cmd.contains_pair("-map", "[a]"));
    }

    #[test]
    fn test_prepare_voice_padding() {
        let padded = encoder().prepare_voice(Path::new("v.mp3"), Some(3.0), Path::new("o.wav"));
        assert_eq!(padded.value_of("-af"), Some("apad=pad_dur=3"));
        assert!(padded.contains_pair("-c:a", "pcm_s16le"));

        let plain = encoder().prepare_voice(Path::new("v.mp3"), None, Path::new("o.wav"));
        assert_eq!(plain.value_of("-af"), None);
        assert!(plain.contains_pair("-ar", "44100"));
    }

    #[test]
    fn test_overlay_keeps_audio() {
        let cmd = encoder().overlay(Path::new("in.mp4"), "drawtext=text='x'", Path::new("out.mp4"));
        assert_eq!(cmd.value_of("-vf"), Some("drawtext=text='x'"));
        assert!(cmd.contains_pair("-c:a", "copy"));
    }
}
