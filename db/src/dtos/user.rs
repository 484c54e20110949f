/// Identity asserted by a verified Google or Firebase credential.
pub struct GoogleProfile {
    pub google_id: String,
    pub email: String,
    pub name: String,
    pub picture_url: Option<String>,
}
