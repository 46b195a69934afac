//! Bundled baseline policies.
//!
//! Seeded into the `default/` subdirectory of the policy repository when it
//! does not exist yet, so a fresh deployment starts with a sane baseline.

/// (file name, document) pairs written into a fresh `default/` directory.
pub(crate) const BASELINE_POLICIES: &[(&str, &str)] = &[
    (
        "permit-repository-admin.xml",
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Policy PolicyId="urn:reliq:policies:default:permit-repository-admin"
        RuleCombiningAlgId="urn:reliq:names:authz:1.0:combining:ordered-deny-overrides">
  <Description>The repository administrator may perform any operation.</Description>
  <Target>
    <Match Category="subject"
           AttributeId="urn:reliq:names:authz:1.0:subject:login-id"
           DataType="http://www.w3.org/2001/XMLSchema#string"
           Function="equal">repositoryAdmin</Match>
  </Target>
  <Rule RuleId="permit-everything" Effect="Permit"/>
</Policy>
"#,
    ),
    (
        "deny-unpublished-objects.xml",
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Policy PolicyId="urn:reliq:policies:default:deny-unpublished-objects"
        RuleCombiningAlgId="urn:reliq:names:authz:1.0:combining:ordered-deny-overrides">
  <Description>Objects withdrawn from circulation are inaccessible.</Description>
  <Rule RuleId="deny-inactive" Effect="Deny">
    <Target>
      <Match Category="resource"
             AttributeId="urn:reliq:names:authz:1.0:resource:object:state"
             DataType="http://www.w3.org/2001/XMLSchema#string"
             Function="equal">I</Match>
    </Target>
  </Rule>
  <Rule RuleId="deny-deleted" Effect="Deny">
    <Target>
      <Match Category="resource"
             AttributeId="urn:reliq:names:authz:1.0:resource:object:state"
             DataType="http://www.w3.org/2001/XMLSchema#string"
             Function="equal">D</Match>
    </Target>
  </Rule>
</Policy>
"#,
    ),
];
