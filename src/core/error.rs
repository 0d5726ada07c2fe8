// =============================================================================
// ERROR — La taxonomie des erreurs du moteur de liens
// =============================================================================
//
// Toutes les erreurs sont renvoyées de façon synchrone à l'appelant :
// aucune n'est journalisée par le cœur, aucune n'est réessayée.
//
// Deux phases, deux familles :
//   - CONFIGURATION : construire les chaînes d'une projection peut échouer
//     (propriété inconnue, conversion impossible...). L'erreur est enveloppée
//     dans LinkEstablishing et ne concerne QUE ce type.
//   - EXÉCUTION : projeter ou fusionner un enregistrement peut échouer
//     (relation introuvable, profondeur dépassée...). L'erreur est enveloppée
//     dans LinkProcessing avec l'enregistrement fautif.
//
// =============================================================================

use thiserror::Error;

use super::instance::Record;

/// Résultat standard du crate.
pub type LinkResult<T> = Result<T, LinkError>;

/// Erreur principale.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Aucun champ ni accesseur calculé de ce nom sur le type.
    #[error("propriété inconnue '{property}' sur le type {type_name}")]
    UnknownProperty { type_name: String, property: String },

    /// Un segment de référence pointillée n'existe pas.
    #[error("impossible de résoudre '{reference}' depuis {type_name} : {reason}")]
    PathResolution {
        type_name: String,
        reference: String,
        reason: String,
    },

    /// Aucun descripteur déclaré sous ce nom.
    #[error("type inconnu : {0}")]
    UnknownType(String),

    /// Le type n'est pas une projection enregistrée et configurée.
    #[error("le type {0} n'est pas une projection configurée")]
    NotProcessable(String),

    /// Échec de construction des chaînes d'un type de projection.
    #[error("impossible d'établir les liens de {type_name}")]
    LinkEstablishing {
        type_name: String,
        #[source]
        source: Box<LinkError>,
    },

    /// Échec d'exécution d'une projection ou d'une fusion.
    #[error("impossible de traiter {} vers {target_type}", record_label(.record))]
    LinkProcessing {
        record: Option<Box<Record>>,
        target_type: String,
        #[source]
        source: Box<LinkError>,
    },

    /// Profondeur de projection imbriquée dépassée.
    #[error("profondeur de projection maximale ({0}) dépassée")]
    DepthExceeded(usize),

    /// Écriture sur une propriété calculée.
    #[error("la propriété '{property}' de {type_name} est en lecture seule")]
    ReadOnly { type_name: String, property: String },

    /// Un segment intermédiaire ne peut pas être instancié.
    #[error("impossible d'instancier '{property}' ({field_type}) sur {type_name}")]
    NotInstantiable {
        type_name: String,
        property: String,
        field_type: String,
    },

    /// Entité introuvable lors d'une résolution de relation par clé.
    #[error("entité {entity_type} introuvable pour la clé {key}")]
    RelationNotFound { entity_type: String, key: String },

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    /// Échec remonté par un backend de requêtes.
    #[error("erreur du backend : {0}")]
    Backend(String),

    #[error("configuration invalide : {0}")]
    Config(String),
}

fn record_label(record: &Option<Box<Record>>) -> String {
    match record {
        Some(r) => r.type_name().to_string(),
        None => "<aucun enregistrement>".to_string(),
    }
}

impl LinkError {
    pub fn unknown_property(type_name: &str, property: &str) -> Self {
        LinkError::UnknownProperty {
            type_name: type_name.to_string(),
            property: property.to_string(),
        }
    }

    pub fn path(type_name: &str, reference: &str, reason: impl Into<String>) -> Self {
        LinkError::PathResolution {
            type_name: type_name.to_string(),
            reference: reference.to_string(),
            reason: reason.into(),
        }
    }

    /// Enveloppe une erreur de construction pour un type donné.
    pub fn establishing(type_name: &str, source: LinkError) -> Self {
        LinkError::LinkEstablishing {
            type_name: type_name.to_string(),
            source: Box::new(source),
        }
    }

    /// Enveloppe une erreur d'exécution avec l'enregistrement fautif.
    pub fn processing(record: Option<&Record>, target_type: &str, source: LinkError) -> Self {
        // Pas de double enveloppe quand une projection imbriquée échoue déjà.
        if let LinkError::LinkProcessing { .. } = source {
            return source;
        }
        LinkError::LinkProcessing {
            record: record.map(|r| Box::new(r.clone())),
            target_type: target_type.to_string(),
            source: Box::new(source),
        }
    }
}

/// Coercition de valeur impossible.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    /// Combinaison de types non supportée.
    #[error("conversion non supportée de {from} vers {to}")]
    Unsupported { from: String, to: String },

    /// Nom de constante absent de l'énumération.
    #[error("constante '{name}' absente de l'énumération {enum_type}")]
    UnknownConstant { enum_type: String, name: String },

    /// Ordinal hors limites.
    #[error("ordinal {ordinal} hors limites pour l'énumération {enum_type}")]
    OrdinalOutOfRange { enum_type: String, ordinal: i64 },

    /// Chaîne non interprétable pour le type cible.
    #[error("valeur '{value}' non interprétable comme {to}")]
    Unparsable { value: String, to: String },
}

impl ConversionError {
    pub fn unsupported(from: impl ToString, to: impl ToString) -> Self {
        ConversionError::Unsupported {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Construction de filtre invalide, rejetée dès l'appel fautif.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("options mutuellement exclusives : choisir '{first}' OU '{second}'")]
    MutuallyExclusive {
        first: &'static str,
        second: &'static str,
    },

    #[error("filtre JSON invalide : {0}")]
    InvalidJson(String),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processing_does_not_double_wrap() {
        let inner = LinkError::processing(None, "AccountDto", LinkError::DepthExceeded(3));
        let outer = LinkError::processing(None, "ClientDto", inner);
        match outer {
            LinkError::LinkProcessing { target_type, .. } => assert_eq!(target_type, "AccountDto"),
            other => panic!("attendu LinkProcessing, obtenu {:?}", other),
        }
    }

    #[test]
    fn test_messages_name_both_types() {
        let err = ConversionError::unsupported("Boolean", "Enum(Gender)");
        let msg = err.to_string();
        assert!(msg.contains("Boolean"));
        assert!(msg.contains("Enum(Gender)"));
    }

    #[test]
    fn test_establishing_keeps_source() {
        let err = LinkError::establishing("ClientDto", LinkError::unknown_property("Client", "nope"));
        let source = std::error::Error::source(&err).map(|s| s.to_string()).unwrap_or_default();
        assert!(source.contains("nope"));
    }
}
