//! Role request assembly
//!
//! Every build receives a fixed baseline permission set. A repository's
//! access document can only add to it.

use mastermind_types::{
    vars, AccessPolicyDocument, BuildEnvironment, PermissionResource, Permissions, Principal,
    ProjectIdentifier, RoleRequest, BUILD_ENVIRONMENT_TAG,
};

use crate::config::AccessConfig;
use crate::error::AccessResult;

/// Inputs of the baseline permission table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaselineSettings {
    pub aws_region: String,
    pub aws_account_id: String,
    pub scratch_bucket: String,
    pub build_numbers_function_arn: String,
}

impl BaselineSettings {
    pub fn from_config(config: &AccessConfig) -> AccessResult<Self> {
        Ok(Self {
            aws_region: AccessConfig::required(&config.aws_region, "AWS_REGION")?.to_string(),
            aws_account_id: AccessConfig::required(&config.aws_account_id, "AWS_ACCOUNT_ID")?
                .to_string(),
            scratch_bucket: config.scratch_bucket.clone(),
            build_numbers_function_arn: config.build_numbers_function_arn.clone(),
        })
    }
}

/// Builds the request submitted to Mastermind
#[derive(Debug, Clone)]
pub struct RoleRequestBuilder {
    baseline: BaselineSettings,
    principal: Principal,
}

impl RoleRequestBuilder {
    pub fn new(baseline: BaselineSettings, principal: Principal) -> Self {
        Self {
            baseline,
            principal,
        }
    }

    /// Baseline followed by the document's resources, verbatim
    pub fn build(
        &self,
        env: &BuildEnvironment,
        document: Option<&AccessPolicyDocument>,
    ) -> AccessResult<RoleRequest> {
        let pipeline_slug = env.pipeline_slug()?;

        let mut resources = self.baseline_permissions(env)?;
        if let Some(document) = document {
            resources.extend(document.resources().iter().cloned());
        }

        Ok(RoleRequest {
            project_identifier: ProjectIdentifier::for_pipeline(pipeline_slug),
            environment: BUILD_ENVIRONMENT_TAG.to_string(),
            principal: self.principal.clone(),
            permissions: Permissions { resources },
        })
    }

    /// Permissions every build receives
    pub fn baseline_permissions(
        &self,
        env: &BuildEnvironment,
    ) -> AccessResult<Vec<PermissionResource>> {
        let BaselineSettings {
            aws_region: region,
            aws_account_id: account,
            ..
        } = &self.baseline;
        let pipeline_slug = env.pipeline_slug()?;

        let mut buckets = vec![self.baseline.scratch_bucket.as_str()];
        if let Some(bucket) = env
            .get(vars::ARTIFACT_UPLOAD_DESTINATION)
            .and_then(artifact_bucket)
        {
            if !buckets.contains(&bucket) {
                buckets.push(bucket);
            }
        }

        Ok(vec![
            PermissionResource::new(
                [
                    format!("arn:aws:ssm:{region}:{account}:parameter/common/ENVIRONMENT"),
                    format!("arn:aws:ssm:{region}:{account}:parameter/common/ENVIRONMENT_NAME"),
                    format!("arn:aws:ssm:{region}:{account}:parameter/build/common/*"),
                    format!("arn:aws:ssm:{region}:{account}:parameter/build/{pipeline_slug}/*"),
                ],
                ["ssm:GetParameter", "ssm:GetParameters", "ssm:GetParametersByPath"],
            ),
            PermissionResource::new(
                [self.baseline.build_numbers_function_arn.as_str()],
                ["lambda:InvokeFunction"],
            ),
            PermissionResource::new(
                buckets.iter().flat_map(|bucket| {
                    [format!("arn:aws:s3:::{bucket}"), format!("arn:aws:s3:::{bucket}/*")]
                }),
                [
                    "s3:GetObject",
                    "s3:PutObject",
                    "s3:DeleteObject",
                    "s3:GetObjectVersion",
                    "s3:ListBucket",
                ],
            ),
            PermissionResource::new(
                [format!("arn:aws:ecr:{region}:{account}:*")],
                ["ecr:GetAuthorizationToken", "ecr:DescribeRepositories"],
            ),
            PermissionResource::new(
                [format!("arn:aws:ecr:{region}:{account}:repository/*")],
                [
                    "ecr:BatchCheckLayerAvailability",
                    "ecr:GetDownloadUrlForLayer",
                    "ecr:GetRepositoryPolicy",
                    "ecr:ListImages",
                    "ecr:DescribeImages",
                    "ecr:BatchGetImage",
                    "ecr:InitiateLayerUpload",
                    "ecr:UploadLayerPart",
                    "ecr:CompleteLayerUpload",
                    "ecr:PutImage",
                ],
            ),
        ])
    }
}

/// Bucket name of an `s3://bucket/prefix` artifact destination
fn artifact_bucket(destination: &str) -> Option<&str> {
    let rest = destination.strip_prefix("s3://")?;
    let bucket = rest.split('/').next()?;
    (!bucket.is_empty()).then_some(bucket)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> RoleRequestBuilder {
        RoleRequestBuilder::new(
            BaselineSettings {
                aws_region: "us-west-2".into(),
                aws_account_id: "123456789012".into(),
                scratch_bucket: "tc-build-scratch".into(),
                build_numbers_function_arn: "arn:aws:lambda:us-west-2:1:function:build-numbers"
                    .into(),
            },
            Principal::aws("arn:aws:iam::123456789012:role/buildkite-agent"),
        )
    }

    fn env() -> BuildEnvironment {
        BuildEnvironment::from_iter([("BUILDKITE_PIPELINE_SLUG", "widgets")])
    }

    fn document() -> AccessPolicyDocument {
        AccessPolicyDocument::new(vec![PermissionResource::new(
            ["arn:aws:dynamodb:us-west-2:123456789012:table/widgets"],
            ["dynamodb:GetItem"],
        )])
    }

    #[test]
    fn test_baseline_only_without_document() {
        let request = builder().build(&env(), None).unwrap();

        assert_eq!(request.project_identifier.as_str(), "buildkite:widgets");
        assert_eq!(request.environment, "build");
        assert_eq!(request.principal.kind, "AWS");
        assert_eq!(
            request.resources(),
            builder().baseline_permissions(&env()).unwrap().as_slice()
        );
    }

    #[test]
    fn test_document_appended_after_baseline() {
        let builder = builder();
        let baseline = builder.baseline_permissions(&env()).unwrap();
        let request = builder.build(&env(), Some(&document())).unwrap();

        assert_eq!(request.resources().len(), baseline.len() + 1);
        assert_eq!(&request.resources()[..baseline.len()], baseline.as_slice());
        assert_eq!(request.resources().last(), document().resources().first());
    }

    #[test]
    fn test_baseline_never_removed() {
        let builder = builder();
        let baseline = builder.baseline_permissions(&env()).unwrap();
        let documents = [
            AccessPolicyDocument::new(vec![]),
            document(),
            AccessPolicyDocument::new(baseline.clone()),
        ];

        for doc in &documents {
            let request = builder.build(&env(), Some(doc)).unwrap();
            for entry in &baseline {
                assert!(request.resources().contains(entry));
            }
        }
    }

    #[test]
    fn test_pipeline_scoped_parameters() {
        let baseline = builder().baseline_permissions(&env()).unwrap();
        assert!(baseline[0]
            .arns
            .contains(&"arn:aws:ssm:us-west-2:123456789012:parameter/build/widgets/*".to_string()));
    }

    #[test]
    fn test_artifact_bucket_granted() {
        let env = BuildEnvironment::from_iter([
            ("BUILDKITE_PIPELINE_SLUG", "widgets"),
            ("BUILDKITE_ARTIFACT_UPLOAD_DESTINATION", "s3://widget-artifacts/$BUILDKITE_JOB_ID"),
        ]);
        let baseline = builder().baseline_permissions(&env).unwrap();

        assert_eq!(
            baseline[2].arns,
            vec![
                "arn:aws:s3:::tc-build-scratch",
                "arn:aws:s3:::tc-build-scratch/*",
                "arn:aws:s3:::widget-artifacts",
                "arn:aws:s3:::widget-artifacts/*",
            ]
        );
    }

    #[test]
    fn test_artifact_bucket_parsing() {
        assert_eq!(artifact_bucket("s3://bucket/path/to"), Some("bucket"));
        assert_eq!(artifact_bucket("s3://bucket"), Some("bucket"));
        assert_eq!(artifact_bucket("s3://"), None);
        assert_eq!(artifact_bucket("gs://bucket/path"), None);
    }

    #[test]
    fn test_missing_pipeline_slug() {
        let err = builder().build(&BuildEnvironment::new(), None).unwrap_err();
        assert!(err.to_string().contains("BUILDKITE_PIPELINE_SLUG"));
    }
}
