use std::{
    collections::{BTreeMap, VecDeque},
    path::Path,
};

use log::{debug, info};
use thiserror::Error;

use crate::{
    backend::BackendError,
    cache::{CacheError, RepositoryCache},
    model::{
        package::{DependencySpec, PackageSpec, ProjectId},
        ParseError,
    },
    universe::{FetchedPackage, PackageContents, Universe},
};

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Error while preparing a checkout: {0}")]
    Cache(#[from] CacheError),
    #[error("Error while fetching {project}: {source}")]
    Backend {
        project: ProjectId,
        #[source]
        source: BackendError,
    },
    #[error("Invalid package spec of {project}: {source}")]
    Spec {
        project: ProjectId,
        #[source]
        source: ParseError,
    },
    #[error(
        "Conflicting revisions of {project}: {first_requester} pins {first_revision}, \
        {second_requester} pins {second_revision}"
    )]
    Conflict {
        project: ProjectId,
        first_requester: ProjectId,
        first_revision: String,
        second_requester: ProjectId,
        second_revision: String,
    },
    #[error(
        "Conflicting repositories for {project}: {first_requester} uses {first_url}, \
        {second_requester} uses {second_url}"
    )]
    UrlConflict {
        project: ProjectId,
        first_requester: ProjectId,
        first_url: String,
        second_requester: ProjectId,
        second_url: String,
    },
    #[error("{url} was declared as {expected} but its package spec names {actual}")]
    ProjectIdMismatch {
        expected: ProjectId,
        actual: ProjectId,
        url: String,
    },
    #[error("Error while scanning the recipes of {project}: {source}")]
    Scan {
        project: ProjectId,
        #[source]
        source: std::io::Error,
    },
}

struct Request {
    requester: ProjectId,
    project: ProjectId,
    dependency: DependencySpec,
}

/// Checks out every transitive dependency of `root` and returns the closed universe.
///
/// `root_path` is the repository holding `root`; it is used in place. The
/// first failure aborts the whole resolution.
pub fn resolve<Cache: RepositoryCache>(
    root: &PackageSpec,
    root_path: &Path,
    cache: &Cache,
) -> Result<Universe, FetchError> {
    let root_id = root.project_id.clone();
    root.validate().map_err(|source| FetchError::Spec {
        project: root_id.clone(),
        source,
    })?;

    let mut packages: BTreeMap<ProjectId, FetchedPackage> = BTreeMap::new();
    let mut first_requests: BTreeMap<ProjectId, (ProjectId, DependencySpec)> = BTreeMap::new();
    let mut queue: VecDeque<Request> = VecDeque::new();

    enqueue(&mut queue, root);
    packages.insert(
        root_id.clone(),
        FetchedPackage {
            contents: scan(&root_id, &root.recipes_root(root_path))?,
            spec: root.clone(),
            local_path: root_path.to_path_buf(),
            backend: None,
            commit: None,
        },
    );

    while let Some(request) = queue.pop_front() {
        let Request {
            requester,
            project,
            dependency,
        } = request;

        if project == root_id {
            debug!("{} depends back on the root package, skipping", requester);
            continue;
        }

        if let Some((first_requester, first)) = first_requests.get(&project) {
            // Already in the universe; the declaration must agree with it.
            if let Some(package) = packages.get(&project) {
                check_compatible(&project, package, first_requester, first, &requester, &dependency)?;
            }
            continue;
        }

        info!(
            "Resolving {} from {} at {}",
            project, dependency.url, dependency.revision
        );
        let backend = cache.backend(&project, &dependency.url)?;
        let on_backend_error = |source| FetchError::Backend {
            project: project.clone(),
            source,
        };
        let commit = backend
            .checkout(&dependency.revision)
            .map_err(on_backend_error)?;
        let metadata = backend
            .commit_metadata(commit.as_str())
            .map_err(on_backend_error)?;

        let spec = metadata.spec;
        spec.validate().map_err(|source| FetchError::Spec {
            project: project.clone(),
            source,
        })?;
        if spec.project_id != project {
            return Err(FetchError::ProjectIdMismatch {
                expected: project,
                actual: spec.project_id,
                url: dependency.url,
            });
        }

        enqueue(&mut queue, &spec);
        let local_path = backend.local_path().to_path_buf();
        let contents = scan(&project, &spec.recipes_root(&local_path))?;
        info!("Resolved {} at {}", project, commit);

        first_requests.insert(project.clone(), (requester, dependency));
        packages.insert(
            project,
            FetchedPackage {
                spec,
                local_path,
                backend: Some(backend),
                commit: Some(commit),
                contents,
            },
        );
    }

    info!("Resolved {} packages", packages.len());
    Ok(Universe::new(root_id, packages))
}

fn enqueue(queue: &mut VecDeque<Request>, spec: &PackageSpec) {
    for (project, dependency) in &spec.dependencies {
        queue.push_back(Request {
            requester: spec.project_id.clone(),
            project: project.clone(),
            dependency: dependency.clone(),
        });
    }
}

fn scan(project: &ProjectId, recipes_root: &Path) -> Result<PackageContents, FetchError> {
    PackageContents::scan(recipes_root).map_err(|source| FetchError::Scan {
        project: project.clone(),
        source,
    })
}

/// A repeated declaration must name the same repository and a revision
/// that resolves to the commit already checked out.
fn check_compatible(
    project: &ProjectId,
    package: &FetchedPackage,
    first_requester: &ProjectId,
    first: &DependencySpec,
    requester: &ProjectId,
    dependency: &DependencySpec,
) -> Result<(), FetchError> {
    if first.url != dependency.url {
        return Err(FetchError::UrlConflict {
            project: project.clone(),
            first_requester: first_requester.clone(),
            first_url: first.url.clone(),
            second_requester: requester.clone(),
            second_url: dependency.url.clone(),
        });
    }
    if first.revision == dependency.revision {
        debug!("{} is already resolved", project);
        return Ok(());
    }

    let conflict = || FetchError::Conflict {
        project: project.clone(),
        first_requester: first_requester.clone(),
        first_revision: first.revision.clone(),
        second_requester: requester.clone(),
        second_revision: dependency.revision.clone(),
    };
    let (Some(backend), Some(commit)) = (&package.backend, &package.commit) else {
        return Err(conflict());
    };
    let other = backend
        .resolve(&dependency.revision)
        .map_err(|source| FetchError::Backend {
            project: project.clone(),
            source,
        })?;
    if &other == commit {
        debug!(
            "{} and {} both resolve to {} for {}",
            first.revision, dependency.revision, commit, project
        );
        Ok(())
    } else {
        Err(conflict())
    }
}
