use std::fmt::Debug;

const DEFAULT_REGION: &str = "us-east-1";

/// Builder for [`BedrockConfig`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BedrockConfigBuilder {
    api_key: String,
    region: Option<String>,
    endpoint: Option<String>,
}

impl BedrockConfigBuilder {
    /// Creates a builder with the given Bedrock API key.
    #[inline]
    pub fn with_api_key<S: Into<String>>(api_key: S) -> Self {
        Self {
            api_key: api_key.into(),
            region: None,
            endpoint: None,
        }
    }

    /// Sets the AWS region, `us-east-1` by default.
    #[inline]
    pub fn with_region<S: Into<String>>(mut self, region: S) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Sets a custom endpoint, overriding the one derived from the region.
    #[inline]
    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Builds the configuration.
    #[inline]
    pub fn build(self) -> BedrockConfig {
        let region = self.region.unwrap_or_else(|| DEFAULT_REGION.to_owned());
        let endpoint = self
            .endpoint
            .map(|e| e.trim_end_matches('/').to_owned())
            .unwrap_or_else(|| {
                format!("https://bedrock-runtime.{region}.amazonaws.com")
            });
        BedrockConfig {
            api_key: self.api_key,
            region,
            endpoint,
        }
    }
}

impl Debug for BedrockConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BedrockConfigBuilder")
            .field("api_key", &"<redacted>")
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Configuration for the Bedrock provider.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BedrockConfig {
    pub(crate) api_key: String,
    pub(crate) region: String,
    pub(crate) endpoint: String,
}

impl BedrockConfig {
    /// Returns the region requests are sent to.
    #[inline]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Returns the base URL of the runtime endpoint.
    #[inline]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Debug for BedrockConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BedrockConfig")
            .field("api_key", &"<redacted>")
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_from_region() {
        let config = BedrockConfigBuilder::with_api_key("secret")
            .with_region("eu-west-1")
            .build();
        assert_eq!(
            config.endpoint(),
            "https://bedrock-runtime.eu-west-1.amazonaws.com"
        );

        let config = BedrockConfigBuilder::with_api_key("secret").build();
        assert_eq!(config.region(), "us-east-1");
    }

    #[test]
    fn test_custom_endpoint() {
        let config = BedrockConfigBuilder::with_api_key("secret")
            .with_endpoint("http://localhost:4566/")
            .build();
        assert_eq!(config.endpoint(), "http://localhost:4566");
    }

    #[test]
    fn test_debug_hides_api_key() {
        let config = BedrockConfigBuilder::with_api_key("secret").build();
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("<redacted>"));
    }
}
