//! S3 operation names

use std::fmt;

/// Every operation the gateway routes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiMethod {
    BucketDelete,
    BucketDeleteCors,
    BucketDeleteWebsite,
    BucketGet,
    BucketGetAcl,
    BucketGetCors,
    BucketGetVersioning,
    BucketGetWebsite,
    BucketHead,
    BucketPut,
    BucketPutAcl,
    BucketPutCors,
    BucketPutVersioning,
    BucketPutWebsite,
    CorsPreflight,
    CompleteMultipartUpload,
    InitiateMultipartUpload,
    ListMultipartUploads,
    ListParts,
    MultiObjectDelete,
    MultipartDelete,
    ObjectCopy,
    ObjectDelete,
    ObjectGet,
    ObjectGetAcl,
    ObjectHead,
    ObjectPut,
    ObjectPutAcl,
    ObjectPutPart,
    ObjectPutCopyPart,
    ServiceGet,
    WebsiteGet,
    WebsiteHead,
}

impl ApiMethod {
    /// Operation name as used in authorization contexts
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BucketDelete => "bucketDelete",
            Self::BucketDeleteCors => "bucketDeleteCors",
            Self::BucketDeleteWebsite => "bucketDeleteWebsite",
            Self::BucketGet => "bucketGet",
            Self::BucketGetAcl => "bucketGetACL",
            Self::BucketGetCors => "bucketGetCors",
            Self::BucketGetVersioning => "bucketGetVersioning",
            Self::BucketGetWebsite => "bucketGetWebsite",
            Self::BucketHead => "bucketHead",
            Self::BucketPut => "bucketPut",
            Self::BucketPutAcl => "bucketPutACL",
            Self::BucketPutCors => "bucketPutCors",
            Self::BucketPutVersioning => "bucketPutVersioning",
            Self::BucketPutWebsite => "bucketPutWebsite",
            Self::CorsPreflight => "corsPreflight",
            Self::CompleteMultipartUpload => "completeMultipartUpload",
            Self::InitiateMultipartUpload => "initiateMultipartUpload",
            Self::ListMultipartUploads => "listMultipartUploads",
            Self::ListParts => "listParts",
            Self::MultiObjectDelete => "multiObjectDelete",
            Self::MultipartDelete => "multipartDelete",
            Self::ObjectCopy => "objectCopy",
            Self::ObjectDelete => "objectDelete",
            Self::ObjectGet => "objectGet",
            Self::ObjectGetAcl => "objectGetACL",
            Self::ObjectHead => "objectHead",
            Self::ObjectPut => "objectPut",
            Self::ObjectPutAcl => "objectPutACL",
            Self::ObjectPutPart => "objectPutPart",
            Self::ObjectPutCopyPart => "objectPutCopyPart",
            Self::ServiceGet => "serviceGet",
            Self::WebsiteGet => "websiteGet",
            Self::WebsiteHead => "websiteHead",
        }
    }

    /// Served without authentication
    #[must_use]
    pub const fn is_bypass(self) -> bool {
        matches!(self, Self::WebsiteGet | Self::WebsiteHead | Self::CorsPreflight)
    }

    /// Reads a source object named by `x-amz-copy-source`
    #[must_use]
    pub const fn is_copy(self) -> bool {
        matches!(self, Self::ObjectCopy | Self::ObjectPutCopyPart)
    }

    /// Receives the live body instead of a buffered one
    #[must_use]
    pub const fn is_streaming(self) -> bool {
        matches!(self, Self::ObjectPut | Self::ObjectPutPart)
    }

    /// Authorization is decided inside the handler
    #[must_use]
    pub const fn defers_authorization(self) -> bool {
        matches!(self, Self::MultiObjectDelete | Self::BucketPut)
    }
}

impl fmt::Display for ApiMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check applied to a buffered body before the handler runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyCheck {
    None,
    Versioning,
    CreateBucket,
}

const BODY_CHECKS: &[(ApiMethod, BodyCheck)] = &[
    (ApiMethod::BucketPutVersioning, BodyCheck::Versioning),
    (ApiMethod::BucketPut, BodyCheck::CreateBucket),
];

impl BodyCheck {
    #[must_use]
    pub fn for_method(method: ApiMethod) -> Self {
        BODY_CHECKS
            .iter()
            .find(|(m, _)| *m == method)
            .map_or(Self::None, |(_, check)| *check)
    }
}
