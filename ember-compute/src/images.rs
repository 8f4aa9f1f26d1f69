//! Image endpoints

use reqwest::Method;
use tracing::debug;

use crate::ComputeClient;
use crate::error::Result;
use crate::model::Image;

impl ComputeClient {
    /// Resolve the newest non-deprecated image of a family
    ///
    /// # Arguments
    /// * `project` - Project owning the image family (may differ from the client's project)
    /// * `family` - Image family name
    pub async fn image_from_family(&self, project: &str, family: &str) -> Result<Image> {
        debug!("Getting image {} from project {}", family, project);
        let url = format!(
            "{}/projects/{}/global/images/family/{}",
            self.base_url, project, family
        );
        let response = self.request(Method::GET, &url).send().await?;

        let image: Image = self.handle_response(response).await?;
        debug!("Got {}", image.self_link);
        Ok(image)
    }
}
