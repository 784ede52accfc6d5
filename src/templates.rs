//! Template System - one rendering rule per generated file
//!
//! Every rule is a pure function of [`RenderInput`]. Same input, same bytes.

use serde::{Deserialize, Serialize};
use serde_json::ser::{Formatter, PrettyFormatter};
use std::io;

use crate::identifier::ModuleIdentifier;
use crate::request::MetadataFields;
use crate::{MODULE_KEYWORDS, MODULE_VERSION};

/// The closed set of generated files, in write order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Manifest,
    RuntimeConfig,
    EntryModule,
    Controller,
    View,
    AssetBundle,
}

impl FileKind {
    pub const ALL: [FileKind; 6] = [
        FileKind::Manifest,
        FileKind::RuntimeConfig,
        FileKind::EntryModule,
        FileKind::Controller,
        FileKind::View,
        FileKind::AssetBundle,
    ];

    /// Path inside the module tree, `/`-separated.
    pub fn relative_path(self) -> &'static str {
        match self {
            FileKind::Manifest => "module.json",
            FileKind::RuntimeConfig => "config.php",
            FileKind::EntryModule => "Module.php",
            FileKind::Controller => "controllers/DefaultController.php",
            FileKind::View => "views/default/index.php",
            FileKind::AssetBundle => "assets/Assets.php",
        }
    }
}

/// Everything a rendering rule may read.
#[derive(Debug, Clone, Copy)]
pub struct RenderInput<'a> {
    pub identifier: &'a ModuleIdentifier,
    pub fields: &'a MetadataFields,
    pub min_platform_version: &'a str,
}

/// Render the contents of one generated file.
pub fn render(kind: FileKind, input: &RenderInput<'_>) -> Result<String, serde_json::Error> {
    match kind {
        FileKind::Manifest => render_manifest(input),
        FileKind::RuntimeConfig => Ok(render_runtime_config(input.identifier)),
        FileKind::EntryModule => Ok(render_entry_module(input.identifier)),
        FileKind::Controller => Ok(render_controller(input.identifier)),
        FileKind::View => Ok(render_view(input.identifier)),
        FileKind::AssetBundle => Ok(render_asset_bundle(input.identifier)),
    }
}

// --- module.json ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModuleManifest {
    pub id: String,
    pub name: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub version: String,
    pub humhub: PlatformRequirement,
    pub authors: Vec<ManifestAuthor>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlatformRequirement {
    pub min_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestAuthor {
    pub name: String,
    pub email: String,
    pub homepage: String,
    pub role: String,
}

impl ModuleManifest {
    pub fn new(input: &RenderInput<'_>) -> Self {
        let fields = input.fields;
        Self {
            id: input.identifier.as_str().to_string(),
            name: input.identifier.display_name(),
            description: fields.description.clone(),
            keywords: MODULE_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            version: MODULE_VERSION.to_string(),
            humhub: PlatformRequirement {
                min_version: input.min_platform_version.to_string(),
            },
            authors: vec![ManifestAuthor {
                name: fields.author.clone(),
                email: fields.email.clone(),
                homepage: fields.homepage.clone(),
                role: fields.role.clone(),
            }],
        }
    }
}

fn render_manifest(input: &RenderInput<'_>) -> Result<String, serde_json::Error> {
    let manifest = ModuleManifest::new(input);

    let mut out = Vec::new();
    let formatter = ManifestFormatter::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    manifest.serialize(&mut serializer)?;
    out.push(b'\n');

    String::from_utf8(out).map_err(<serde_json::Error as serde::ser::Error>::custom)
}

/// Four-space pretty printing with every non-ASCII character written as a
/// `\uXXXX` escape (UTF-16 surrogate pairs above the BMP). Slashes stay
/// unescaped.
struct ManifestFormatter {
    pretty: PrettyFormatter<'static>,
}

impl ManifestFormatter {
    fn new() -> Self {
        Self {
            pretty: PrettyFormatter::with_indent(b"    "),
        }
    }
}

impl Formatter for ManifestFormatter {
    fn begin_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.begin_array(writer)
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.end_array(writer)
    }

    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        self.pretty.begin_array_value(writer, first)
    }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.end_array_value(writer)
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.begin_object(writer)
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.end_object(writer)
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        self.pretty.begin_object_key(writer, first)
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.begin_object_value(writer)
    }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.end_object_value(writer)
    }

    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        let mut units = [0u16; 2];
        for c in fragment.chars() {
            if c.is_ascii() {
                writer.write_all(&[c as u8])?;
            } else {
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}

// --- config.php ---

fn render_runtime_config(id: &ModuleIdentifier) -> String {
    let namespace = id.namespace();
    format!(
        r"<?php

return [
    'id' => '{id}',
    'class' => '{namespace}\Module',
    'namespace' => '{namespace}',
    'events' => [
        [
            'class' => \humhub\modules\admin\widgets\AdminMenu::class,
            'event' => \humhub\modules\admin\widgets\AdminMenu::EVENT_INIT,
            'callback' => ['{namespace}\Module', 'onAdminMenuInit']
        ]
    ],
    'params' => [
        // Include any custom parameters your module might use here
    ]
];
"
    )
}

// --- Module.php ---

fn render_entry_module(id: &ModuleIdentifier) -> String {
    let namespace = id.namespace();
    let category = id.message_category();
    format!(
        r"<?php

namespace {namespace};

use Yii;
use yii\helpers\Url;
use humhub\modules\ui\menu\MenuLink;
use humhub\modules\ui\icon\widgets\Icon;
use humhub\components\Module as BaseModule;

class Module extends BaseModule
{{
    /**
     * Event handler to initialize the Admin Menu.
     *
     * @param \yii\base\Event $event Event data.
     */
    public static function onAdminMenuInit($event)
    {{
        /** @var \humhub\modules\admin\widgets\AdminMenu $menu */
        $menu = $event->sender;

        $menu->addEntry(new MenuLink([
            'label' => Yii::t('{category}', 'My Module'),
            'url' => Url::to(['/{id}/admin/index']),
            'icon' => Icon::get('folder'),
            'isActive' => (Yii::$app->controller->module && Yii::$app->controller->module->id == '{id}' && Yii::$app->controller->id == '{id}'),
            'sortOrder' => 700,
            'isVisible' => true,
        ]));
    }}

    /**
     * Initializes the module.
     */
    public function init()
    {{
        parent::init();
    }}
}}
"
    )
}

// --- controllers/DefaultController.php ---

fn render_controller(id: &ModuleIdentifier) -> String {
    let namespace = id.namespace();
    format!(
        r"<?php

namespace {namespace}\controllers;

use humhub\modules\admin\components\Controller;
use Yii;

class DefaultController extends Controller
{{
    /**
     * Renders the index view.
     *
     * @return string Rendered view.
     */
    public function actionIndex()
    {{
        return $this->render('index');
    }}
}}
"
    )
}

// --- views/default/index.php ---

fn render_view(id: &ModuleIdentifier) -> String {
    let namespace = id.namespace();
    let category = id.message_category();
    format!(
        r#"<?php

use {namespace}\assets\Assets;

Assets::register($this);

?>

<div class="panel panel-default">
    <div class="panel-heading">
        <strong><?= Yii::t('{category}', '{id}') ?></strong>
    </div>
    <div class="panel-body">
        <div id="{id}-content">
            <?= \Yii::t('{category}', 'Welcome to the module template.') ?>
        </div>
    </div>
</div>
"#
    )
}

// --- assets/Assets.php ---

fn render_asset_bundle(id: &ModuleIdentifier) -> String {
    let namespace = id.namespace();
    format!(
        r"<?php

namespace {namespace}\assets;

use yii\web\AssetBundle;

class Assets extends AssetBundle
{{
    public $sourcePath = '@{id}/resources';

    public $css = [
        'css/module.css'
    ];

    public $js = [
        'js/module.js'
    ];

    public $depends = [
        'humhub\assets\AppAsset'
    ];
}}
"
    )
}
