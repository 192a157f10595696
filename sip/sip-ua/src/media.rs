use audio::AudioEngine;
use sdp::SessionDescription;
use std::net::Ipv4Addr;
use video::VideoEngine;

/// The two transport engines of the user agent together with their local ports
pub(crate) struct Media {
    pub(crate) audio: AudioEngine,
    pub(crate) video: VideoEngine,
    audio_port: u16,
    video_port: u16,
}

impl Media {
    pub(crate) fn new(
        audio: AudioEngine,
        video: VideoEngine,
        audio_port: u16,
        video_port: u16,
    ) -> Self {
        Self {
            audio,
            video,
            audio_port,
            video_port,
        }
    }

    /// Local offer or answer, the video line is only included if `video` is set
    pub(crate) fn local_description(&self, local_ip: Ipv4Addr, video: bool) -> SessionDescription {
        SessionDescription::new(local_ip, self.audio_port, video.then_some(self.video_port))
    }

    /// Start the engines for every media the remote description has an endpoint for.
    ///
    /// Engine failures are logged, they never affect signaling.
    pub(crate) async fn start(&self, remote: &SessionDescription) {
        match remote.audio_endpoint() {
            Some(endpoint) => {
                if let Err(e) = self.audio.start(endpoint, self.audio_port).await {
                    log::error!("failed to start audio to {endpoint}, {e}");
                }
            }
            None => log::warn!("remote session description has no usable audio endpoint"),
        }

        if let Some(endpoint) = remote.video_endpoint() {
            if let Err(e) = self.video.start(endpoint, self.video_port).await {
                log::error!("failed to start video to {endpoint}, {e}");
            }
        }
    }

    /// Stop both engines and drop the frame callbacks
    pub(crate) async fn stop(&self) {
        self.video.clear_frame_callbacks();
        tokio::join!(self.audio.stop(), self.video.stop());
    }
}
