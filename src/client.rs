use std::io::Read;

use crate::config::ClientConfig;
use crate::error::GenerateError;
use crate::options::GenerationOptions;

/// Turns options into SVG markup. Implementations block; the controller
/// runs them on the blocking pool.
pub trait Generator: Send + Sync + 'static {
    fn generate(&self, options: &GenerationOptions) -> Result<String, GenerateError>;
}

/// POSTs options as JSON to the generation service and returns the body text.
pub struct HttpGenerator {
    agent: ureq::Agent,
    url: String,
}

impl HttpGenerator {
    pub fn new(config: &ClientConfig) -> Self {
        let mut builder = ureq::AgentBuilder::new();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        Self {
            agent: builder.build(),
            url: config.url(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Generator for HttpGenerator {
    fn generate(&self, options: &GenerationOptions) -> Result<String, GenerateError> {
        let body = serde_json::to_string(options)?;
        tracing::info!(url = %self.url, seed = %options.seed, "requesting image");

        let response = match self
            .agent
            .post(&self.url)
            .set("Content-Type", "application/json")
            .send_string(&body)
        {
            Ok(response) => response,
            // Any response with a body counts; only transport failures are errors.
            Err(ureq::Error::Status(code, response)) => {
                tracing::warn!(status = code, "generation service returned an error status");
                response
            }
            Err(ureq::Error::Transport(err)) => {
                return Err(GenerateError::Transport(err.to_string()));
            }
        };

        // `into_string` caps bodies at 10 MB; large canvases exceed that.
        let mut markup = String::new();
        response.into_reader().read_to_string(&mut markup)?;
        Ok(markup)
    }
}
